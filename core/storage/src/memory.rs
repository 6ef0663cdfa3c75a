//! In-memory store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use objstore_common::{resolve_bucket, validate_bucket_name, Error, ObjectPath, Result};

use crate::config::{downcast_config, DriverConfig};
use crate::registry::DriverRegistry;
use crate::store::{content_type_for, format_timestamp, BucketInfo, ObjectMetadata, Store};
use crate::stream::{probe_size, DataSource};

/// Driver name of the in-memory backend.
pub const DRIVER_NAME: &str = "memory";

/// Configuration for the in-memory backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Buckets created up front.
    #[serde(default)]
    pub buckets: Vec<String>,
}

impl DriverConfig for MemoryConfig {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Stored object.
#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    content_type: String,
    etag: String,
    modified: DateTime<Utc>,
}

impl Entry {
    fn metadata(&self, key: &str) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_string(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            etag: self.etag.clone(),
            last_modified: format_timestamp(self.modified),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryBucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, Entry>,
}

impl MemoryBucket {
    fn new() -> Self {
        Self {
            created: Utc::now(),
            objects: BTreeMap::new(),
        }
    }
}

/// In-memory store.
///
/// Behaves like an S3 bucket service: objects can only be written into
/// existing buckets, and non-empty buckets refuse deletion. All data is lost
/// on drop.
pub struct MemoryStore {
    buckets: Arc<RwLock<BTreeMap<String, MemoryBucket>>>,
    bucket: Option<String>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(BTreeMap::new())),
            bucket: None,
        }
    }

    /// Create a store from configuration, pre-creating its buckets.
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        let mut buckets = BTreeMap::new();
        for name in &config.buckets {
            validate_bucket_name(name)?;
            buckets.insert(name.clone(), MemoryBucket::new());
        }
        Ok(Self {
            buckets: Arc::new(RwLock::new(buckets)),
            bucket: None,
        })
    }

    fn resolve(&self, name: &str) -> Result<ObjectPath> {
        ObjectPath::split(self.bucket.as_deref(), name)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the in-memory driver.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(
        DRIVER_NAME,
        Box::new(|config| {
            let config = downcast_config::<MemoryConfig>(config, DRIVER_NAME)?;
            Ok(Box::new(MemoryStore::from_config(config)?) as Box<dyn Store>)
        }),
    );
}

#[async_trait]
impl Store for MemoryStore {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn set_bucket(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() {
            warn!("Empty bucket name, using full path for objects");
            self.bucket = None;
            return Ok(false);
        }

        if !self.buckets.read().await.contains_key(name) {
            return Err(Error::BucketNotFound(name.to_string()));
        }

        self.bucket = Some(name.to_string());
        Ok(true)
    }

    async fn set_region(&mut self, _region: &str) -> Result<()> {
        Ok(())
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(name) {
            return Err(Error::BucketAlreadyExists(name.to_string()));
        }
        buckets.insert(name.to_string(), MemoryBucket::new());
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let mut buckets = self.buckets.write().await;
        match buckets.get(name) {
            None => Ok(()),
            Some(bucket) if !bucket.objects.is_empty() => {
                Err(Error::BucketNotEmpty(name.to_string()))
            }
            Some(_) => {
                buckets.remove(name);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                creation_date: format_timestamp(bucket.created),
            })
            .collect())
    }

    async fn create_object(&self, name: &str, data: DataSource, content_type: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let (data, size) = probe_size(data)
            .await
            .map_err(|e| Error::PreconditionFailed(e.to_string()))?;
        let data = data.into_bytes(size).await?;

        let entry = Entry {
            data,
            content_type: content_type_for(path.key(), content_type),
            etag: Uuid::new_v4().simple().to_string(),
            modified: Utc::now(),
        };

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(path.bucket())
            .ok_or_else(|| Error::BucketNotFound(path.bucket().to_string()))?;

        debug!(bucket = %path.bucket(), key = %path.key(), size, "Stored object");
        bucket.objects.insert(path.key().to_string(), entry);
        Ok(())
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        let buckets = self.buckets.read().await;

        let bucket = buckets
            .get(path.bucket())
            .ok_or_else(|| Error::BucketNotFound(path.bucket().to_string()))?;

        Ok(bucket.objects.get(path.key()).map(|entry| entry.data.to_vec()))
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let mut buckets = self.buckets.write().await;

        let bucket = buckets
            .get_mut(path.bucket())
            .ok_or_else(|| Error::BucketNotFound(path.bucket().to_string()))?;
        bucket.objects.remove(path.key());
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMetadata>> {
        let bucket = resolve_bucket(self.bucket.as_deref(), bucket)?;
        let buckets = self.buckets.read().await;

        let contents = buckets
            .get(&bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.clone()))?;

        Ok(contents
            .objects
            .iter()
            .map(|(key, entry)| entry.metadata(key))
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        let path = self.resolve(name)?;
        let buckets = self.buckets.read().await;

        Ok(buckets
            .get(path.bucket())
            .and_then(|bucket| bucket.objects.get(path.key()))
            .map(|entry| entry.metadata(path.key())))
    }

    async fn copy_object(&self, src: &str, dest: &str) -> Result<()> {
        let src = self.resolve(src)?;
        let dest = self.resolve(dest)?;
        let mut buckets = self.buckets.write().await;

        let entry = buckets
            .get(src.bucket())
            .ok_or_else(|| Error::BucketNotFound(src.bucket().to_string()))?
            .objects
            .get(src.key())
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(src.to_string()))?;

        let target = buckets
            .get_mut(dest.bucket())
            .ok_or_else(|| Error::BucketNotFound(dest.bucket().to_string()))?;

        target.objects.insert(
            dest.key().to_string(),
            Entry {
                etag: Uuid::new_v4().simple().to_string(),
                modified: Utc::now(),
                ..entry
            },
        );
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_bucket(name: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_bucket(name).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_memory_create_read() {
        let store = store_with_bucket("b").await;
        store.create_object("b/hello.txt", DataSource::from("hello"), "").await.unwrap();

        let data = store.read_object("b/hello.txt").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"hello"[..]));

        let meta = store.metadata("b/hello.txt").await.unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.key, "hello.txt");
    }

    #[tokio::test]
    async fn test_memory_missing_object() {
        let store = store_with_bucket("b").await;

        assert!(store.read_object("b/none").await.unwrap().is_none());
        assert!(store.exists("b/none").await.unwrap().is_none());
        assert!(matches!(
            store.metadata("b/none").await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_write_into_missing_bucket() {
        let store = MemoryStore::new();
        let result = store.create_object("nope/k", DataSource::from("x"), "").await;
        assert!(matches!(result, Err(Error::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_bucket_lifecycle() {
        let store = store_with_bucket("b").await;

        assert!(matches!(
            store.create_bucket("b").await,
            Err(Error::BucketAlreadyExists(_))
        ));

        store.create_object("b/k", DataSource::from("x"), "").await.unwrap();
        assert!(matches!(
            store.delete_bucket("b").await,
            Err(Error::BucketNotEmpty(_))
        ));

        store.delete_object("b/k").await.unwrap();
        store.delete_bucket("b").await.unwrap();
        store.delete_bucket("b").await.unwrap();
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_bucket_context() {
        let mut store = store_with_bucket("b").await;

        assert!(matches!(
            store.set_bucket("missing").await,
            Err(Error::BucketNotFound(_))
        ));
        assert!(store.bucket().is_none());

        assert!(store.set_bucket("b").await.unwrap());
        store.create_object("dir/k.txt", DataSource::from("x"), "").await.unwrap();
        assert!(store.exists("dir/k.txt").await.unwrap().is_some());

        let listed = store.list_objects("").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "dir/k.txt");

        assert!(!store.set_bucket("").await.unwrap());
        assert!(store.exists("b/dir/k.txt").await.unwrap().is_some());
        assert!(matches!(
            store.list_objects("").await,
            Err(Error::InvalidBucketName(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_update_keeps_content_type() {
        let store = store_with_bucket("b").await;

        assert!(matches!(
            store.update_object("b/k", DataSource::from("x")).await,
            Err(Error::ObjectNotFound(_))
        ));

        store
            .create_object("b/k", DataSource::from("{}"), "application/json")
            .await
            .unwrap();
        store.update_object("b/k", DataSource::from("[]")).await.unwrap();

        let meta = store.metadata("b/k").await.unwrap();
        assert_eq!(meta.content_type, "application/json");
        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"[]");
    }

    #[tokio::test]
    async fn test_memory_copy_and_move() {
        let store = store_with_bucket("a").await;
        store.create_bucket("b").await.unwrap();
        store.create_object("a/k", DataSource::from("data"), "").await.unwrap();

        store.copy_object("a/k", "b/k").await.unwrap();
        assert!(store.exists("a/k").await.unwrap().is_some());
        assert!(store.exists("b/k").await.unwrap().is_some());

        store.move_object("b/k", "b/moved").await.unwrap();
        assert!(store.exists("b/k").await.unwrap().is_none());
        assert_eq!(store.read_object("b/moved").await.unwrap().unwrap(), b"data");

        assert!(matches!(
            store.copy_object("a/none", "b/x").await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_invalid_names() {
        let store = store_with_bucket("b").await;
        assert!(matches!(
            store.read_object("b/").await,
            Err(Error::InvalidObjectName(_))
        ));
        assert!(matches!(
            store.create_bucket("").await,
            Err(Error::InvalidBucketName(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = MemoryConfig {
            buckets: vec!["a".to_string(), "bad/name".to_string()],
        };
        assert!(matches!(
            MemoryStore::from_config(&config),
            Err(Error::InvalidBucketName(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_move_onto_itself_keeps_object() {
        let store = store_with_bucket("b").await;
        store.create_object("b/k", DataSource::from("hello"), "").await.unwrap();

        store.move_object("b/k", "b/k").await.unwrap();
        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"hello");
    }
}
