//! Configuration for blob-relay

use crate::handler::{HandlerOptions, DEFAULT_MAX_BLOB_BYTES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default storage directory for the file driver
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blob-relay")
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Memory,
    File,
    S3,
    Gcs,
    Azure,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverKind::Memory => "memory",
            DriverKind::File => "file",
            DriverKind::S3 => "s3",
            DriverKind::Gcs => "gcs",
            DriverKind::Azure => "azure",
        };
        f.write_str(name)
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the HTTP server binds
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    pub driver: DriverKind,

    /// Root directory for the file driver
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: u64,

    /// Serve the legacy `/v1/` routes
    #[serde(default = "default_true")]
    pub enable_v1: bool,

    /// Serialize concurrent v2 PUTs of the same key
    #[serde(default = "default_true")]
    pub serialize_same_key_puts: bool,

    /// Bucket (or Azure container) for object store drivers
    #[serde(default)]
    pub bucket: Option<String>,

    /// Region for the S3 driver
    #[serde(default)]
    pub region: Option<String>,

    /// Path prefix inside the bucket
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8577))
}

fn default_max_blob_bytes() -> u64 {
    DEFAULT_MAX_BLOB_BYTES
}

fn default_true() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            driver: DriverKind::default(),
            storage_dir: default_storage_dir(),
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
            enable_v1: true,
            serialize_same_key_puts: true,
            bucket: None,
            region: None,
            prefix: None,
        }
    }
}

impl RelayConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Options the blob handlers run with
    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            max_blob_bytes: self.max_blob_bytes,
            serialize_same_key_puts: self.serialize_same_key_puts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr.port(), 8577);
        assert_eq!(config.driver, DriverKind::Memory);
        assert_eq!(config.max_blob_bytes, 1024 * 1024 * 1024);
        assert!(config.enable_v1);
        assert!(config.serialize_same_key_puts);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            driver = "file"
            storage_dir = "/var/lib/blob-relay"
            enable_v1 = false
            "#,
        )
        .unwrap();

        assert_eq!(config.driver, DriverKind::File);
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/blob-relay"));
        assert!(!config.enable_v1);
        assert_eq!(config.listen_addr, default_listen_addr());
        assert_eq!(config.max_blob_bytes, DEFAULT_MAX_BLOB_BYTES);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = RelayConfig {
            driver: DriverKind::S3,
            bucket: Some("payloads".into()),
            region: Some("us-east-1".into()),
            max_blob_bytes: 4096,
            ..RelayConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = RelayConfig::load(&path).unwrap();
        assert_eq!(loaded.driver, DriverKind::S3);
        assert_eq!(loaded.bucket.as_deref(), Some("payloads"));
        assert_eq!(loaded.handler_options().max_blob_bytes, 4096);
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let result: Result<RelayConfig, _> = toml::from_str(r#"driver = "ftp""#);
        assert!(result.is_err());
    }
}
