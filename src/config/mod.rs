//! Configuration module for large-objects
//!
//! Handles loading and parsing of the YAML configuration file: the object
//! storage services that can be targeted, upload defaults, logging and
//! metrics output. Environment variables are expanded before parsing, so
//! tokens can stay out of the file:
//!
//! ```yaml
//! services:
//!   - name: object-storage
//!     storage_url: https://swift.example.com/v1/AUTH_abc
//!     auth_token: ${OS_AUTH_TOKEN}
//! upload:
//!   concurrency: 8
//!   resume_check: size_and_hash
//! ```

use crate::slo::job::{ResumeCheck, DEFAULT_MAX_SEGMENTS};
use crate::store::SwiftClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigLoader};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "large-objects.yaml";

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("No service named '{0}' is configured")]
    UnknownService(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one service must be configured".into(),
            ));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Service name cannot be empty".into(),
                ));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' is configured more than once",
                    service.name
                )));
            }
            if !is_valid_http_url(&service.storage_url) {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' has invalid storage_url: must start with http:// or https://",
                    service.name
                )));
            }
            // An unexpanded placeholder means the variable was not set
            if service.auth_token.trim().is_empty() || service.auth_token.contains("${") {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' has no auth_token",
                    service.name
                )));
            }
        }

        if self.upload.progress_interval_millis == 0 {
            return Err(ConfigError::ValidationError(
                "upload.progress_interval_millis must be greater than 0".into(),
            ));
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be 'trace', 'debug', 'info', 'warn' or 'error'",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))
    }
}

/// One object storage service (storage URL plus a pre-obtained token)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub storage_url: String,
    pub auth_token: String,
    /// Per-request timeout. 0 disables it. Default: 300
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ServiceConfig {
    /// Client settings for this service
    pub fn client_config(&self) -> SwiftClientConfig {
        SwiftClientConfig {
            storage_url: self.storage_url.clone(),
            auth_token: self.auth_token.clone(),
            timeout: (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds)),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    300
}

/// Upload defaults; command-line flags take precedence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Worker count. 0 selects the host's available parallelism
    #[serde(default)]
    pub concurrency: usize,
    /// Segment limit per manifest. 0 disables the check
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
    #[serde(default)]
    pub resume_check: ResumeCheck,
    #[serde(default)]
    pub cleanup_on_failure: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_millis: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            max_segments: default_max_segments(),
            resume_check: ResumeCheck::default(),
            cleanup_on_failure: false,
            progress_interval_millis: default_progress_interval(),
        }
    }
}

impl UploadConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_millis)
    }
}

fn default_max_segments() -> usize {
    DEFAULT_MAX_SEGMENTS
}

fn default_progress_interval() -> u64 {
    1000
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level; `RUST_LOG` takes precedence. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Write Prometheus metrics to this file after each command
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            storage_url: "https://swift.example.com/v1/AUTH_test".into(),
            auth_token: "token".into(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    fn config(services: Vec<ServiceConfig>) -> Config {
        Config {
            services,
            ..Config::default()
        }
    }

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.concurrency, 0);
        assert_eq!(config.max_segments, 1000);
        assert_eq!(config.resume_check, ResumeCheck::Size);
        assert!(!config.cleanup_on_failure);
        assert_eq!(config.progress_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation_empty_services() {
        assert!(config(vec![]).validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_service() {
        let err = config(vec![service("a"), service("a")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut bad = service("a");
        bad.storage_url = "swift.example.com".into();
        assert!(config(vec![bad]).validate().is_err());
    }

    #[test]
    fn test_config_validation_unexpanded_token() {
        let mut bad = service("a");
        bad.auth_token = "${OS_AUTH_TOKEN}".into();
        assert!(config(vec![bad]).validate().is_err());
    }

    #[test]
    fn test_config_validation_log_level() {
        let mut cfg = config(vec![service("a")]);
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());
        cfg.logging.level = "DEBUG".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_service_lookup() {
        let cfg = config(vec![service("a"), service("b")]);
        assert_eq!(cfg.service("b").unwrap().name, "b");
        assert!(matches!(
            cfg.service("c"),
            Err(ConfigError::UnknownService(name)) if name == "c"
        ));
    }

    #[test]
    fn test_client_config_timeout() {
        let mut svc = service("a");
        assert_eq!(
            svc.client_config().timeout,
            Some(Duration::from_secs(300))
        );
        svc.timeout_seconds = 0;
        assert_eq!(svc.client_config().timeout, None);
    }
}
