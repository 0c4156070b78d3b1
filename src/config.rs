//! Configuration module for the file bucket service.

use serde::Deserialize;
use std::path::Path;

use crate::{BucketError, Result};

/// Web API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number for the Web API.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/file_bucket.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Blob and upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the bucket file blobs.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Directory holding staged uploads.
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Maximum size of a single decoded archive in megabytes.
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size_mb: u64,
}

fn default_storage_path() -> String {
    "data/files".to_string()
}

fn default_upload_path() -> String {
    "data/uploads".to_string()
}

fn default_max_archive_size() -> u64 {
    512
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            upload_path: default_upload_path(),
            max_archive_size_mb: default_max_archive_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/file_bucket.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BucketError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BucketError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILE_BUCKET_STORAGE_PATH`: Override the blob storage directory
    /// - `FILE_BUCKET_DATABASE_PATH`: Override the database file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FILE_BUCKET_STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.storage_path = path;
            }
        }
        if let Ok(path) = std::env::var("FILE_BUCKET_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the archive size limit is zero
    /// - blobs and staged uploads share one directory
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_archive_size_mb == 0 {
            return Err(BucketError::Config(
                "max_archive_size_mb must be greater than zero".to_string(),
            ));
        }
        if Path::new(&self.storage.storage_path) == Path::new(&self.storage.upload_path) {
            return Err(BucketError::Config(
                "storage_path and upload_path must be different directories".to_string(),
            ));
        }
        Ok(())
    }

    /// Archive size limit in bytes.
    pub fn max_archive_size(&self) -> u64 {
        self.storage.max_archive_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 8080);
        assert!(config.web.cors_origins.is_empty());

        assert_eq!(config.database.path, "data/file_bucket.db");

        assert_eq!(config.storage.storage_path, "data/files");
        assert_eq!(config.storage.upload_path, "data/uploads");
        assert_eq!(config.storage.max_archive_size_mb, 512);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/file_bucket.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[web]
host = "127.0.0.1"
port = 3000
cors_origins = ["http://localhost:5173"]

[database]
path = "custom/db.sqlite"

[storage]
storage_path = "custom/files"
upload_path = "custom/uploads"
max_archive_size_mb = 64

[logging]
level = "debug"
file = "custom/logs/app.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 3000);
        assert_eq!(config.web.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.database.path, "custom/db.sqlite");
        assert_eq!(config.storage.storage_path, "custom/files");
        assert_eq!(config.storage.upload_path, "custom/uploads");
        assert_eq!(config.storage.max_archive_size_mb, 64);
        assert_eq!(config.max_archive_size(), 64 * 1024 * 1024);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[web]
port = 9000
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.storage.storage_path, "data/files");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.database.path, "data/file_bucket.db");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        if let Err(BucketError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(BucketError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides_storage_path() {
        let original = std::env::var("FILE_BUCKET_STORAGE_PATH").ok();

        std::env::set_var("FILE_BUCKET_STORAGE_PATH", "/srv/buckets");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.storage.storage_path, "/srv/buckets");

        std::env::set_var("FILE_BUCKET_STORAGE_PATH", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.storage.storage_path, "data/files");

        if let Some(val) = original {
            std::env::set_var("FILE_BUCKET_STORAGE_PATH", val);
        } else {
            std::env::remove_var("FILE_BUCKET_STORAGE_PATH");
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_archive_size() {
        let mut config = Config::default();
        config.storage.max_archive_size_mb = 0;
        assert!(matches!(config.validate(), Err(BucketError::Config(_))));
    }

    #[test]
    fn test_validate_shared_directories() {
        let mut config = Config::default();
        config.storage.upload_path = config.storage.storage_path.clone();

        let result = config.validate();
        if let Err(BucketError::Config(msg)) = result {
            assert!(msg.contains("upload_path"));
        } else {
            panic!("Expected Config error");
        }
    }
}
