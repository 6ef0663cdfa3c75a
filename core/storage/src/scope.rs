//! Bucket-scoped view of a store.

use tracing::debug;

use objstore_common::{validate_bucket_name, Error, Result, PATH_SEPARATOR};

use crate::store::{ObjectMetadata, Store};
use crate::stream::DataSource;

/// Object operations fixed to one bucket.
///
/// Takes bare keys like a store with a bound bucket, but never touches the
/// store's own context, so any number of scopes over different buckets can
/// share one store.
pub struct BucketScope<'a> {
    store: &'a dyn Store,
    bucket: String,
    qualify: bool,
}

impl<'a> BucketScope<'a> {
    /// Create a scope over `bucket`.
    ///
    /// # Preconditions
    /// - The store is unbound, or bound to `bucket` itself
    ///
    /// # Errors
    /// - `InvalidBucketName` if the name is malformed, or if the store is
    ///   bound to a different bucket
    pub fn new(store: &'a dyn Store, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        validate_bucket_name(&bucket)?;

        let qualify = match store.bucket() {
            None => true,
            Some(bound) if bound == bucket => false,
            Some(bound) => {
                return Err(Error::InvalidBucketName(format!(
                    "{} (store is bound to {})",
                    bucket, bound
                )))
            }
        };

        debug!(bucket = %bucket, driver = %store.driver_name(), "Opened bucket scope");
        Ok(Self {
            store,
            bucket,
            qualify,
        })
    }

    /// The scoped bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn name(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(Error::InvalidObjectName(key.to_string()));
        }
        Ok(if self.qualify {
            format!("{}{}{}", self.bucket, PATH_SEPARATOR, key)
        } else {
            key.to_string()
        })
    }

    /// Write `key` into the scoped bucket.
    ///
    /// # Postconditions
    /// - The object exists under `key`, replacing any previous content
    ///
    /// # Errors
    /// - `InvalidObjectName` if `key` is empty
    /// - Whatever the store reports for the upload
    pub async fn create_object(&self, key: &str, data: DataSource, content_type: &str) -> Result<()> {
        self.store.create_object(&self.name(key)?, data, content_type).await
    }

    /// Read `key`, or `None` if it does not exist.
    pub async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.read_object(&self.name(key)?).await
    }

    /// Overwrite an existing object, keeping its content type.
    ///
    /// # Preconditions
    /// - `key` must exist
    ///
    /// # Errors
    /// - `ObjectNotFound` if it does not
    pub async fn update_object(&self, key: &str, data: DataSource) -> Result<()> {
        self.store.update_object(&self.name(key)?, data).await
    }

    /// Delete `key`. Deleting an absent object succeeds.
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.store.delete_object(&self.name(key)?).await
    }

    /// List every object in the scoped bucket.
    pub async fn list_objects(&self) -> Result<Vec<ObjectMetadata>> {
        self.store.list_objects(&self.bucket).await
    }

    /// Look up `key`; absence is `Ok(None)`.
    pub async fn exists(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        self.store.exists(&self.name(key)?).await
    }

    /// Metadata of `key`.
    ///
    /// # Errors
    /// - `ObjectNotFound` if it does not exist
    pub async fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        self.store.metadata(&self.name(key)?).await
    }

    /// Copy `src` to `dest` within the scoped bucket.
    ///
    /// # Errors
    /// - `ObjectNotFound` if `src` does not exist
    pub async fn copy_object(&self, src: &str, dest: &str) -> Result<()> {
        self.store.copy_object(&self.name(src)?, &self.name(dest)?).await
    }

    /// Move `src` to `dest` within the scoped bucket.
    ///
    /// Not atomic; see [`Store::move_object`].
    pub async fn move_object(&self, src: &str, dest: &str) -> Result<()> {
        self.store.move_object(&self.name(src)?, &self.name(dest)?).await
    }
}
