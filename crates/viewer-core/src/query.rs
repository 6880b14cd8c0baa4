//! Query-string driven viewer selection
//!
//! `?mode=canvas` forces the raster viewer even when a native embed is
//! available, `?id=<certificate>` picks the document for the certificate
//! viewer.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerSelection {
    Canvas,
    NativeEmbed,
}

impl ViewerSelection {
    pub fn from_query(query: &str, native_embed_available: bool) -> Self {
        let force_canvas = query_param(query, "mode").is_some_and(|mode| mode == "canvas");

        if force_canvas || !native_embed_available {
            Self::Canvas
        } else {
            Self::NativeEmbed
        }
    }
}

/// First value of `name` in a URL query string (leading `?` optional)
pub fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid certificate catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate certificate id '{0}'")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateEntry {
    pub id: String,
    pub title: String,
    /// Path, URL or `data:` URI of the certificate document
    pub source: String,
}

/// Certificates the viewer can display, addressed by `id`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateCatalog {
    entries: Vec<CertificateEntry>,
}

impl CertificateCatalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;

        for (index, entry) in catalog.entries.iter().enumerate() {
            if catalog.entries[..index].iter().any(|earlier| earlier.id == entry.id) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }

        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&CertificateEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Entry selected by the `id` query parameter
    pub fn resolve_query(&self, query: &str) -> Option<&CertificateEntry> {
        self.get(&query_param(query, "id")?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
