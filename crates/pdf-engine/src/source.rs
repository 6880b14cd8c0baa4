use crate::PdfEngineError;
use base64::Engine as _;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// `data:[<media type>][;base64],<payload>`
    DataUri(String),
    /// `http(s)://` locator fetched on the blocking pool
    Url(String),
}

impl OpenSource {
    /// Classify a locator string the way a page link would be interpreted
    pub fn parse(locator: &str) -> Self {
        let trimmed = locator.trim();

        if trimmed.starts_with("data:") {
            Self::DataUri(trimmed.to_owned())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_owned())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    /// Short description for logs; never includes inline payloads
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::DataUri(uri) => format!("<data uri, {} chars>", uri.len()),
            Self::Url(url) => url.clone(),
        }
    }

    pub(crate) async fn read(self) -> Result<Vec<u8>, PdfEngineError> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?),
            Self::Bytes(bytes) => Ok(bytes),
            Self::DataUri(uri) => decode_data_uri(&uri),
            Self::Url(url) => tokio::task::spawn_blocking(move || fetch_url(&url))
                .await
                .map_err(|err| PdfEngineError::Fetch(err.to_string()))?,
        }
    }
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, PdfEngineError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| PdfEngineError::InvalidDataUri("missing data: prefix".to_owned()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PdfEngineError::InvalidDataUri("missing ',' separator".to_owned()))?;

    if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| PdfEngineError::InvalidDataUri(err.to_string()))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>, PdfEngineError> {
    let response = ureq::get(url).call().map_err(|err| PdfEngineError::Fetch(err.to_string()))?;

    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes)?;
    Ok(bytes)
}
