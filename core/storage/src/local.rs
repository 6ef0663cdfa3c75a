//! Local filesystem store.
//!
//! Buckets are top-level directories under the base path and object keys are
//! relative file paths beneath them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use objstore_common::{resolve_bucket, validate_bucket_name, Error, ObjectPath, Result};

use crate::config::{downcast_config, DriverConfig};
use crate::registry::DriverRegistry;
use crate::store::{content_type_for, format_timestamp, BucketInfo, ObjectMetadata, Store};
use crate::stream::DataSource;

/// Driver name of the filesystem backend.
pub const DRIVER_NAME: &str = "filesystem";

/// Suffix of in-flight uploads; such files are skipped by listings.
const STAGING_SUFFIX: &str = ".upload";

/// Configuration for the filesystem backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Directory holding one subdirectory per bucket.
    pub base_path: PathBuf,
}

impl FilesystemConfig {
    /// Create a configuration rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl DriverConfig for FilesystemConfig {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Local filesystem store.
pub struct LocalStore {
    root: PathBuf,
    bucket: Option<String>,
}

impl LocalStore {
    /// Create a new store rooted at the configured base path.
    ///
    /// The directory is not touched until [`Store::setup`] or the first write.
    ///
    /// # Errors
    /// - `InvalidEndpoint` if the base path is empty
    pub fn new(config: &FilesystemConfig) -> Result<Self> {
        if config.base_path.as_os_str().is_empty() {
            return Err(Error::InvalidEndpoint);
        }

        Ok(Self {
            root: config.base_path.clone(),
            bucket: None,
        })
    }

    /// Resolve an object name to its path pair and file location.
    fn to_fs_path(&self, name: &str) -> Result<(ObjectPath, PathBuf)> {
        let path = ObjectPath::split(self.bucket.as_deref(), name)?;
        let mut fs_path = self.bucket_dir(path.bucket())?;
        for component in Path::new(path.key()).components() {
            match component {
                Component::Normal(part) => fs_path.push(part),
                _ => return Err(Error::InvalidObjectName(name.to_string())),
            }
        }
        Ok((path, fs_path))
    }

    fn bucket_dir(&self, name: &str) -> Result<PathBuf> {
        validate_bucket_name(name)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidBucketName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Create metadata from filesystem metadata.
    fn create_metadata(key: &str, fs_meta: &std::fs::Metadata) -> ObjectMetadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        ObjectMetadata {
            key: key.to_string(),
            size: fs_meta.len(),
            content_type: content_type_for(key, ""),
            etag: format!("{}-{}", modified.timestamp(), fs_meta.len()),
            last_modified: format_timestamp(modified),
        }
    }
}

/// Map a filesystem error for `resource` onto the taxonomy.
fn map_io(err: std::io::Error, resource: &str, missing: fn(String) -> Error) -> Error {
    match err.kind() {
        ErrorKind::NotFound => missing(resource.to_string()),
        ErrorKind::PermissionDenied => Error::AccessDenied(resource.to_string()),
        _ => Error::Io(err),
    }
}

/// Sibling path an upload is written to before it replaces the target.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}{}", name, Uuid::new_v4().simple(), STAGING_SUFFIX))
}

async fn write_file(path: &Path, data: &mut DataSource) -> Result<u64> {
    let mut file = fs::File::create(path).await?;
    let written = tokio::io::copy(data, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

/// Register the filesystem driver.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(
        DRIVER_NAME,
        Box::new(|config| {
            let config = downcast_config::<FilesystemConfig>(config, DRIVER_NAME)?;
            Ok(Box::new(LocalStore::new(config)?) as Box<dyn Store>)
        }),
    );
}

#[async_trait]
impl Store for LocalStore {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    async fn setup(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn set_bucket(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() {
            warn!("Empty bucket name, using full path for objects");
            self.bucket = None;
            return Ok(false);
        }

        let dir = self.bucket_dir(name)?;
        fs::create_dir_all(&dir).await?;
        self.bucket = Some(name.to_string());
        Ok(true)
    }

    async fn set_region(&mut self, _region: &str) -> Result<()> {
        Ok(())
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let dir = self.bucket_dir(name)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let dir = self.bucket_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e, name, Error::BucketNotFound)),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let fs_meta = entry.metadata().await?;
            if !fs_meta.is_dir() {
                continue;
            }

            let created: DateTime<Utc> = fs_meta
                .created()
                .or_else(|_| fs_meta.modified())
                .map(|t| t.into())
                .unwrap_or_else(|_| Utc::now());

            results.push(BucketInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                creation_date: format_timestamp(created),
            });
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn create_object(&self, name: &str, mut data: DataSource, _content_type: &str) -> Result<()> {
        let (path, fs_path) = self.to_fs_path(name)?;

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Stage beside the target so a failed read never clobbers the old object.
        let staging = staging_path(&fs_path);
        let written = match write_file(&staging, &mut data).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&staging, &fs_path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(map_io(e, name, Error::BucketNotFound));
        }

        debug!(bucket = %path.bucket(), key = %path.key(), size = written, "Wrote object");
        Ok(())
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let (_, fs_path) = self.to_fs_path(name)?;

        match fs::read(&fs_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(e, name, Error::ObjectNotFound)),
        }
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let (_, fs_path) = self.to_fs_path(name)?;

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e, name, Error::ObjectNotFound)),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMetadata>> {
        let bucket = resolve_bucket(self.bucket.as_deref(), bucket)?;
        let base = self.bucket_dir(&bucket)?;

        let mut results = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| map_io(e, &bucket, Error::BucketNotFound))?;

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let fs_meta = entry.metadata().await?;

                if fs_meta.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                if entry.file_name().to_string_lossy().ends_with(STAGING_SUFFIX) {
                    continue;
                }

                let Ok(relative) = entry_path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                results.push(Self::create_metadata(&key, &fs_meta));
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    async fn exists(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        let (path, fs_path) = self.to_fs_path(name)?;

        match fs::metadata(&fs_path).await {
            Ok(fs_meta) if fs_meta.is_file() => Ok(Some(Self::create_metadata(path.key(), &fs_meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(e, name, Error::ObjectNotFound)),
        }
    }

    async fn copy_object(&self, src: &str, dest: &str) -> Result<()> {
        let (_, from_path) = self.to_fs_path(src)?;
        let (_, to_path) = self.to_fs_path(dest)?;

        if !fs::try_exists(&from_path).await? {
            return Err(Error::ObjectNotFound(src.to_string()));
        }
        // fs::copy truncates the target before reading the source.
        if from_path == to_path {
            return Ok(());
        }

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::copy(&from_path, &to_path)
            .await
            .map_err(|e| map_io(e, src, Error::ObjectNotFound))?;
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        debug!("Filesystem cleanup called, no action needed");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidEndpoint);
        }
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalStore {
        LocalStore::new(&FilesystemConfig::new(temp.path())).unwrap()
    }

    #[test]
    fn test_local_requires_base_path() {
        let result = LocalStore::new(&FilesystemConfig::default());
        assert!(matches!(result, Err(Error::InvalidEndpoint)));
    }

    #[tokio::test]
    async fn test_local_end_to_end() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.setup().await.unwrap();

        store
            .create_object("b/k.txt", DataSource::from("hello"), "text/plain")
            .await
            .unwrap();

        let meta = store.exists("b/k.txt").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.key, "k.txt");
        assert_eq!(store.read_object("b/k.txt").await.unwrap().unwrap(), b"hello");

        store.move_object("b/k.txt", "b/k2.txt").await.unwrap();
        assert!(store.exists("b/k.txt").await.unwrap().is_none());
        assert_eq!(store.read_object("b/k2.txt").await.unwrap().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_local_layout_on_disk() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store
            .create_object("photos/2024/01/a.jpg", DataSource::from("jpeg"), "")
            .await
            .unwrap();

        let on_disk = temp.path().join("photos").join("2024").join("01").join("a.jpg");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_local_missing_object() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        assert!(store.read_object("b/none").await.unwrap().is_none());
        assert!(store.exists("b/none").await.unwrap().is_none());
        assert!(matches!(
            store.metadata("b/none").await,
            Err(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            store.update_object("b/none", DataSource::from("x")).await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_bucket_lifecycle() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.setup().await.unwrap();

        store.create_bucket("alpha").await.unwrap();
        store.create_bucket("beta").await.unwrap();

        let names: Vec<String> = store
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        store.delete_bucket("alpha").await.unwrap();
        store.delete_bucket("alpha").await.unwrap();
        store.delete_bucket("never-existed").await.unwrap();
        assert_eq!(store.list_buckets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_list_objects_recursive() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);

        assert!(store.set_bucket("docs").await.unwrap());
        store.create_object("a.txt", DataSource::from("1"), "").await.unwrap();
        store.create_object("nested/b.txt", DataSource::from("22"), "").await.unwrap();
        store.create_object("nested/deep/c.md", DataSource::from("333"), "").await.unwrap();

        let listed = store.list_objects("").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "nested/b.txt", "nested/deep/c.md"]);
        assert_eq!(listed[2].size, 3);

        assert!(!store.set_bucket("").await.unwrap());
        assert!(matches!(
            store.list_objects("").await,
            Err(Error::InvalidBucketName(_))
        ));
        assert_eq!(store.list_objects("docs").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_local_list_missing_bucket() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(matches!(
            store.list_objects("ghost").await,
            Err(Error::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_update_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_object("b/k", DataSource::from("first"), "").await.unwrap();
        store.update_object("b/k", DataSource::from("second")).await.unwrap();
        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_local_copy_across_buckets() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_object("a/k", DataSource::from("data"), "").await.unwrap();
        store.copy_object("a/k", "b/sub/k").await.unwrap();

        assert!(store.exists("a/k").await.unwrap().is_some());
        assert_eq!(store.read_object("b/sub/k").await.unwrap().unwrap(), b"data");
        assert!(matches!(
            store.copy_object("a/none", "b/x").await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for name in ["b/../escape", "b/./k", "../k"] {
            assert!(
                matches!(
                    store.create_object(name, DataSource::from("x"), "").await,
                    Err(Error::InvalidObjectName(_) | Error::InvalidBucketName(_))
                ),
                "{name:?} should be rejected"
            );
        }
        assert!(matches!(
            store.read_object("onlykey").await,
            Err(Error::InvalidObjectName(_))
        ));
    }

    #[tokio::test]
    async fn test_local_delete_object_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_object("b/k", DataSource::from("x"), "").await.unwrap();
        store.delete_object("b/k").await.unwrap();
        store.delete_object("b/k").await.unwrap();
        assert!(store.exists("b/k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_sequential_source() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let body: &'static [u8] = b"piped";

        store
            .create_object("b/pipe.bin", DataSource::sequential(body), "")
            .await
            .unwrap();
        assert_eq!(store.metadata("b/pipe.bin").await.unwrap().size, 5);
    }

    /// Yields one chunk, then fails.
    struct FailingBody {
        sent: bool,
    }

    impl tokio::io::AsyncRead for FailingBody {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(std::io::Error::new(
                    ErrorKind::ConnectionReset,
                    "upstream closed",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_local_copy_onto_itself_keeps_content() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_object("b/k", DataSource::from("hello"), "").await.unwrap();
        store.copy_object("b/k", "b/k").await.unwrap();
        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"hello");

        store.move_object("b/k", "b/k").await.unwrap();
        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"hello");

        assert!(matches!(
            store.move_object("b/none", "b/none").await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_failed_upload_keeps_previous_object() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_object("b/k", DataSource::from("hello"), "").await.unwrap();
        let result = store
            .create_object("b/k", DataSource::sequential(FailingBody { sent: false }), "")
            .await;
        assert!(result.is_err());

        assert_eq!(store.read_object("b/k").await.unwrap().unwrap(), b"hello");
        let listed = store.list_objects("b").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "k");

        let mut entries = std::fs::read_dir(temp.path().join("b")).unwrap();
        assert_eq!(entries.next().unwrap().unwrap().file_name(), "k");
        assert!(entries.next().is_none());
    }
}
