//! Client configuration.
//!
//! Every field has a default, so an empty (or missing) TOML file yields a
//! working configuration pointed at a local backend.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::AppError;

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Hard cap on one process request, matching the upload timeout (5 minutes).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Interval between progress polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Delay between activating a download and requesting cleanup.
const DEFAULT_CLEANUP_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the processing service, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub cleanup_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            cleanup_delay_ms: DEFAULT_CLEANUP_DELAY_MS,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let config: ClientConfig = toml::from_str(raw)
            .map_err(|e| AppError::InvalidParameter(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(AppError::Internal(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn validate(&self) -> Result<(), AppError> {
        self.base_url()?;
        if self.poll_interval_ms == 0 {
            return Err(AppError::InvalidParameter(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::InvalidParameter(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, AppError> {
        Url::parse(&self.base_url)
            .map_err(|e| AppError::InvalidParameter(format!("Invalid base URL: {}", e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.cleanup_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "http://images.local:8080"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://images.local:8080");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.cleanup_delay_ms, DEFAULT_CLEANUP_DELAY_MS);
    }

    #[test]
    fn rejects_invalid_base_url_and_zero_interval() {
        assert!(ClientConfig::from_toml_str(r#"base_url = "not a url""#).is_err());
        assert!(ClientConfig::from_toml_str("poll_interval_ms = 0").is_err());
    }

    #[test]
    fn rejects_zero_request_timeout() {
        let err = ClientConfig::from_toml_str("request_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter(m) if m.contains("request_timeout_secs")));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn loads_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imgbatch.toml");
        std::fs::write(&path, "cleanup_delay_ms = 100\n").unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.cleanup_delay(), Duration::from_millis(100));
    }
}
