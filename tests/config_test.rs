//! Configuration Loading Tests
//!
//! Loads YAML files from disk with environment variable expansion. Tests
//! touching process-wide environment variables run serially.

#[cfg(test)]
mod tests {
    use large_objects::config::{Config, ConfigError, ConfigLoader, LogFormat};
    use large_objects::slo::ResumeCheck;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
services:
  - name: object-storage
    storage_url: https://swift.example.com/v1/AUTH_abc
    auth_token: secret
"#,
        );

        let config = Config::load(file.path()).unwrap();
        let service = config.service("object-storage").unwrap();
        assert_eq!(service.timeout_seconds, 300);
        assert_eq!(config.upload.concurrency, 0);
        assert_eq!(config.upload.max_segments, 1000);
        assert_eq!(config.upload.resume_check, ResumeCheck::Size);
        assert_eq!(config.upload.progress_interval(), Duration::from_secs(1));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.metrics.textfile.is_none());
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r#"
services:
  - name: primary
    storage_url: https://swift-a.example.com/v1/AUTH_a
    auth_token: token-a
    timeout_seconds: 60
  - name: secondary
    storage_url: http://swift-b.example.com/v1/AUTH_b
    auth_token: token-b
upload:
  concurrency: 8
  max_segments: 0
  resume_check: size_and_hash
  cleanup_on_failure: true
  progress_interval_millis: 250
logging:
  level: debug
  format: json
metrics:
  textfile: /var/lib/node_exporter/large_objects.prom
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.service("primary").unwrap().timeout_seconds, 60);
        assert_eq!(config.upload.concurrency, 8);
        assert_eq!(config.upload.max_segments, 0);
        assert_eq!(config.upload.resume_check, ResumeCheck::SizeAndHash);
        assert!(config.upload.cleanup_on_failure);
        assert_eq!(config.upload.progress_interval(), Duration::from_millis(250));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.metrics.textfile.is_some());
    }

    #[test]
    #[serial]
    fn test_token_from_environment() {
        std::env::set_var("LARGE_OBJECTS_TEST_TOKEN", "from-env");
        let file = write_config(
            r#"
services:
  - name: object-storage
    storage_url: ${LARGE_OBJECTS_TEST_URL:-https://swift.example.com/v1/AUTH_abc}
    auth_token: ${LARGE_OBJECTS_TEST_TOKEN}
"#,
        );

        let config = Config::load(file.path());
        std::env::remove_var("LARGE_OBJECTS_TEST_TOKEN");

        let config = config.unwrap();
        let service = config.service("object-storage").unwrap();
        assert_eq!(service.auth_token, "from-env");
        assert_eq!(service.storage_url, "https://swift.example.com/v1/AUTH_abc");
    }

    #[test]
    #[serial]
    fn test_missing_token_variable_fails_validation() {
        std::env::remove_var("LARGE_OBJECTS_TEST_TOKEN");
        let result = ConfigLoader::from_yaml_str(
            r#"
services:
  - name: object-storage
    storage_url: https://swift.example.com/v1/AUTH_abc
    auth_token: ${LARGE_OBJECTS_TEST_TOKEN}
"#,
        );

        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ConfigLoader::from_yaml_str("services: [not: valid: yaml");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_resume_check() {
        let result = ConfigLoader::from_yaml_str(
            r#"
services:
  - name: s
    storage_url: https://swift.example.com/v1/AUTH_abc
    auth_token: t
upload:
  resume_check: checksum
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
