//! Storage factory for creating storage instances from configuration.

use std::sync::Arc;

use slatedb::DbBuilder;
use slatedb::config::Settings;
use slatedb::object_store::{self, ObjectStore};

use super::config::{ObjectStoreConfig, SlateDbStorageConfig, StorageConfig};
use super::in_memory::InMemoryStorage;
use super::slate::SlateDbStorage;
use super::{Storage, StorageError, StorageResult};

/// Creates an object store from configuration.
pub fn create_object_store(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(object_store::memory::InMemory::new())),
        ObjectStoreConfig::Aws(aws_config) => {
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_region(&aws_config.region)
                .with_bucket_name(&aws_config.bucket)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create AWS S3 store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
        ObjectStoreConfig::Local(local_config) => {
            std::fs::create_dir_all(&local_config.path).map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local_config.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local_config.path)
                .map_err(|e| {
                StorageError::Storage(format!("Failed to create local filesystem store: {}", e))
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// Creates a storage instance based on the provided configuration.
///
/// # Examples
///
/// ```rust,ignore
/// use common::StorageConfig;
/// use common::storage::factory::create_storage;
///
/// let storage = create_storage(&StorageConfig::InMemory).await?;
/// ```
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new())),
        StorageConfig::SlateDb(slate_config) => {
            let storage = create_slatedb_storage(slate_config).await?;
            Ok(Arc::new(storage))
        }
    }
}

async fn create_slatedb_storage(config: &SlateDbStorageConfig) -> StorageResult<SlateDbStorage> {
    let object_store = create_object_store(&config.object_store)?;

    let settings = match &config.settings_path {
        Some(path) => Settings::from_file(path).map_err(|e| {
            StorageError::Storage(format!(
                "Failed to load SlateDB settings from {}: {}",
                path, e
            ))
        })?,
        None => Settings::load().unwrap_or_default(),
    };

    let db = DbBuilder::new(config.path.clone(), object_store)
        .with_settings(settings)
        .build()
        .await
        .map_err(|e| StorageError::Storage(format!("Failed to create SlateDB: {}", e)))?;

    tracing::debug!(path = %config.path, "opened SlateDB storage");
    Ok(SlateDbStorage::new(Arc::new(db)))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::Record;

    #[tokio::test]
    async fn should_create_in_memory_storage() {
        // given
        let storage = create_storage(&StorageConfig::InMemory).await.unwrap();

        // when
        storage
            .put(vec![Record::new(Bytes::from("k"), Bytes::from("v"))])
            .await
            .unwrap();

        // then
        let record = storage.get(Bytes::from("k")).await.unwrap();
        assert_eq!(record.unwrap().value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn should_create_slatedb_storage_on_in_memory_object_store() {
        // given
        let config = StorageConfig::SlateDb(SlateDbStorageConfig::default());

        // when
        let storage = create_storage(&config).await.unwrap();

        // then
        assert!(storage.get(Bytes::from("absent")).await.unwrap().is_none());
        storage.close().await.unwrap();
    }
}
