//! Configuration for revlog.
//!
//! This module defines [`Config`], which selects the storage backend and
//! tunes paging and the contention fallback. Configurations deserialize from
//! YAML, with every field optional.

use std::path::Path;

use common::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of items returned per page by the read views.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Configuration for opening a [`CommitLogDb`](crate::CommitLogDb).
///
/// # Example
///
/// ```ignore
/// use revlog::{CommitLogDb, Config};
/// use common::StorageConfig;
///
/// let config = Config {
///     storage: StorageConfig::InMemory,
///     ..Default::default()
/// };
/// let db = CommitLogDb::open(config).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend configuration.
    ///
    /// See [`StorageConfig`] for the in-memory and SlateDB backends.
    pub storage: StorageConfig,

    /// Page size used when a read view is called without an explicit limit.
    pub page_size: usize,

    /// Contention fallback tuning.
    pub fallback: FallbackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            fallback: FallbackConfig::default(),
        }
    }
}

impl Config {
    /// Loads a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidInput(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.fallback.deposit_attempts == 0 {
            return Err(Error::InvalidInput(
                "fallback.deposit_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tuning for the shard fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Total attempts for one shard deposit, counting the first.
    ///
    /// A deposit only conflicts with another deposit into the same shard.
    /// With the default of 1 such a conflict is surfaced immediately as
    /// [`Error::Contention`].
    pub deposit_attempts: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            deposit_attempts: 1,
        }
    }
}
