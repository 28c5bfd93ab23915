//! Configuration module

use crate::{Result, StoreError};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SiloConfig {
    /// Directory listing settings
    #[serde(default)]
    pub listing: ListingConfig,
    /// Upload settings
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Download settings
    #[serde(default)]
    pub read: ReadConfig,
}

/// Listing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Keys per listing page for backends that paginate locally
    pub page_size: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self { page_size: 1000 }
    }
}

/// Upload configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunks buffered between a writer and its transfer task
    pub pipe_depth: usize,
    /// Size of the chunks a writer hands to the transfer task, in bytes
    pub chunk_size: usize,
    /// Bodies at least this large are sent with a multipart upload
    pub multipart_threshold: usize,
    /// Part size for multipart uploads, in bytes
    pub part_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            pipe_depth: 4,
            chunk_size: 1024 * 1024,               // 1MB
            multipart_threshold: 64 * 1024 * 1024, // 64MB
            part_size: 8 * 1024 * 1024,            // 8MB
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Bytes fetched per ranged request on sequential reads
    pub buffer_size: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl SiloConfig {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            StoreError::Config("Unable to determine config directory".to_string())
        })?;
        Ok(config_dir.join("silo").join("config.toml"))
    }

    /// Parse a configuration from TOML text. Missing sections take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SiloConfig = toml::from_str(contents)
            .map_err(|e| StoreError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load the user configuration, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.listing.page_size == 0 {
            return Err(StoreError::Config("listing.page_size must be positive".to_string()));
        }
        if self.transfer.pipe_depth == 0 || self.transfer.chunk_size == 0 {
            return Err(StoreError::Config(
                "transfer.pipe_depth and transfer.chunk_size must be positive".to_string(),
            ));
        }
        // S3 rejects multipart parts below 5MiB except for the last one.
        if self.transfer.part_size < 5 * 1024 * 1024 {
            return Err(StoreError::Config(format!(
                "transfer.part_size must be at least 5MiB, got {}",
                self.transfer.part_size
            )));
        }
        if self.read.buffer_size == 0 {
            return Err(StoreError::Config("read.buffer_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SiloConfig::default();
        assert_eq!(config.listing.page_size, 1000);
        assert_eq!(config.transfer.pipe_depth, 4);
        assert!(config.transfer.multipart_threshold > config.transfer.part_size);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SiloConfig::from_toml_str(
            r#"
            [listing]
            page_size = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.listing.page_size, 250);
        assert_eq!(config.transfer, TransferConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SiloConfig::from_toml_str("[listing]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let err = SiloConfig::from_toml_str("[transfer]\npart_size = 1024\n").unwrap_err();
        assert!(err.to_string().contains("part_size"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        let mut config = SiloConfig::default();
        config.read.buffer_size = 4096;
        config.save_to(&path).unwrap();

        assert_eq!(SiloConfig::load_from(&path).unwrap(), config);
    }
}
