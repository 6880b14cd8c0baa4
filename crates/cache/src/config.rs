//! Cache configuration
//!
//! Settings for the offline cache: the version string that names the
//! current bucket, the site origin, the install manifest, the offline
//! fallback page and the eviction ceiling. Configuration can be loaded
//! from a JSON file, environment variables, or created programmatically.

use crate::request::{origin_of, resolve_url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Configuration for the offline cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Version string; also the name of the current bucket
    pub version: String,
    /// Origin of the site, e.g. `https://example.com`
    pub origin: String,
    /// URLs fetched at install time, relative entries resolved against `origin`
    pub manifest: Vec<String>,
    /// Page served to navigations while offline
    pub offline_url: String,
    /// Eviction ceiling for the current bucket, in bytes
    pub max_bytes: u64,
    pub sweep_interval_secs: u64,
    /// Also keep opaque (no-cors) responses
    pub cache_opaque: bool,
    /// Activate right after every successful install instead of waiting
    /// for an explicit activation or `SkipWaiting`
    pub activate_on_install: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "folio-v1.0.0".to_string(),
            origin: "http://localhost:8080".to_string(),
            manifest: [
                "/",
                "/index.html",
                "/offline.html",
                "/css/main.css",
                "/js/main.js",
                "/assets/files/resume.pdf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_url: "/offline.html".to_string(),
            max_bytes: 50 * MB,
            sweep_interval_secs: 24 * 60 * 60,
            cache_opaque: false,
            activate_on_install: false,
        }
    }
}

impl CacheConfig {
    pub fn new(version: impl Into<String>, origin: impl Into<String>) -> Self {
        Self { version: version.into(), origin: origin.into(), ..Self::default() }
    }

    pub fn with_manifest<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_url(mut self, url: impl Into<String>) -> Self {
        self.offline_url = url.into();
        self
    }

    /// Sets the eviction ceiling in megabytes.
    pub fn with_max_mb(mut self, mb: u64) -> Self {
        self.max_bytes = mb * MB;
        self
    }

    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn with_cache_opaque(mut self, allow: bool) -> Self {
        self.cache_opaque = allow;
        self
    }

    pub fn with_activate_on_install(mut self, activate: bool) -> Self {
        self.activate_on_install = activate;
        self
    }

    /// Period of the background eviction sweep, never below one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_mb(&self) -> u64 {
        self.max_bytes / MB
    }

    /// Manifest entries as absolute URLs
    pub fn manifest_urls(&self) -> Vec<String> {
        self.manifest.iter().map(|url| self.resolve(url)).collect()
    }

    pub fn offline_page_url(&self) -> String {
        self.resolve(&self.offline_url)
    }

    pub fn resolve(&self, url: &str) -> String {
        resolve_url(&self.origin, url)
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FOLIO_CACHE_VERSION`: bucket version string
    /// - `FOLIO_CACHE_ORIGIN`: site origin
    /// - `FOLIO_CACHE_MAX_MB`: eviction ceiling in MB (default: 50)
    /// - `FOLIO_CACHE_SWEEP_SECS`: sweep period in seconds (default: 86400)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FOLIO_CACHE_VERSION") {
            if val.trim().is_empty() {
                return Err(ConfigError::InvalidValue("FOLIO_CACHE_VERSION".to_string()));
            }
            config.version = val;
        }

        if let Ok(val) = std::env::var("FOLIO_CACHE_ORIGIN") {
            config.origin = origin_of(val.trim())
                .ok_or_else(|| ConfigError::InvalidValue("FOLIO_CACHE_ORIGIN".to_string()))?;
        }

        if let Ok(val) = std::env::var("FOLIO_CACHE_MAX_MB") {
            config.max_bytes = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("FOLIO_CACHE_MAX_MB".to_string()))?
                * MB;
        }

        if let Ok(val) = std::env::var("FOLIO_CACHE_SWEEP_SECS") {
            config.sweep_interval_secs = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("FOLIO_CACHE_SWEEP_SECS".to_string()))?;
        }

        Ok(config)
    }

    /// Loads configuration from a JSON file; missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}
