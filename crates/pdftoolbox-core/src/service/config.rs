use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://pdf-services.adobe.io";

/// Connection settings for the extraction service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the PDF Services API
    pub endpoint: String,
    /// TCP/TLS connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Delay between job status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Give up on a job that has not finished after this many seconds
    pub job_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 40_000,
            poll_interval_ms: 2_000,
            job_timeout_secs: 600,
        }
    }
}

impl ServiceConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "service.endpoint".into(),
            value: format!("{} ({e})", self.endpoint),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "service.endpoint".into(),
                value: self.endpoint.clone(),
            });
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "service.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = ServiceConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_secs(40));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let config = ServiceConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            endpoint: "ftp://pdf-services.example".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = ServiceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServiceConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.endpoint, config.endpoint);
        assert_eq!(parsed.read_timeout_ms, config.read_timeout_ms);
    }
}
