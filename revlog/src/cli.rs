//! Command-line arguments for the `revlog` demo binary.

use clap::Parser;
use common::StorageConfig;
use common::storage::config::{AwsObjectStoreConfig, ObjectStoreConfig, SlateDbStorageConfig};

use crate::config::Config;
use crate::error::Result;

/// CLI arguments for the simple-writes demo.
#[derive(Debug, Parser)]
#[command(name = "revlog")]
#[command(about = "Fan concurrent writes into a revisioned commit log and report the result")]
pub struct CliArgs {
    /// Number of concurrent commits to write.
    #[arg(long, default_value = "5")]
    pub tasks: usize,

    /// Name of the log to create. A random name is generated when absent.
    #[arg(long)]
    pub log_name: Option<String>,

    /// YAML configuration file. Storage flags below override its storage.
    #[arg(long)]
    pub config: Option<String>,

    /// Use in-memory storage.
    #[arg(long, default_value = "false")]
    pub in_memory: bool,

    /// Storage data directory path (for local storage).
    #[arg(long)]
    pub data_dir: Option<String>,

    /// S3 bucket name (enables S3 storage when set).
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// AWS region for S3 storage.
    #[arg(long, default_value = "us-east-1")]
    pub s3_region: String,
}

impl CliArgs {
    /// Builds the configuration from the optional file and storage flags.
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_yaml_file(path)?,
            None => Config::default(),
        };
        if let Some(storage) = self.storage_override() {
            config.storage = storage;
        }
        Ok(config)
    }

    fn storage_override(&self) -> Option<StorageConfig> {
        if self.in_memory {
            Some(StorageConfig::InMemory)
        } else if let Some(bucket) = &self.s3_bucket {
            Some(StorageConfig::SlateDb(SlateDbStorageConfig {
                path: "data".to_string(),
                object_store: ObjectStoreConfig::Aws(AwsObjectStoreConfig {
                    region: self.s3_region.clone(),
                    bucket: bucket.clone(),
                }),
                settings_path: None,
            }))
        } else {
            self.data_dir
                .as_ref()
                .map(|dir| StorageConfig::SlateDb(SlateDbStorageConfig::local(dir.clone())))
        }
    }
}
