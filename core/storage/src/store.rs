//! Store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use objstore_common::{Error, Result};

use crate::stream::DataSource;

/// Content type used when neither the caller nor the key says otherwise.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Snapshot of an object's metadata.
///
/// Produced fresh by every existence, metadata and listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object key within its bucket.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub content_type: String,
    /// Opaque entity tag (may be empty when the backend has none).
    pub etag: String,
    /// Last modification time, RFC 3339.
    pub last_modified: String,
}

/// Snapshot of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation time as reported by the backend.
    pub creation_date: String,
}

/// Uniform object storage contract implemented by every backend.
///
/// Object names are resolved with [`objstore_common::split_path`]: while a
/// bucket is bound through [`Store::set_bucket`] names are bare keys,
/// otherwise they must be fully qualified `bucket/key` paths.
///
/// Operations that change the bound bucket or region take `&mut self`, so a
/// store shared behind `Arc` has a frozen context and cannot race a context
/// switch against in-flight operations.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the driver that produced this store.
    fn driver_name(&self) -> &str;

    /// Currently bound bucket, if any.
    fn bucket(&self) -> Option<&str>;

    /// Idempotent backend initialization.
    async fn setup(&self) -> Result<()>;

    /// Bind (or, with an empty name, clear) the current bucket.
    ///
    /// Returns whether a bucket is now bound.
    ///
    /// # Errors
    /// - `BucketNotFound` if the backend tracks buckets and it is absent
    async fn set_bucket(&mut self, name: &str) -> Result<bool>;

    /// Update the session region hint.
    async fn set_region(&mut self, region: &str) -> Result<()>;

    /// Create a bucket.
    ///
    /// # Errors
    /// - `InvalidBucketName` for an empty or malformed name
    /// - `BucketAlreadyExists` where the backend reports a collision
    async fn create_bucket(&self, name: &str) -> Result<()>;

    /// Delete a bucket. Deleting an absent bucket succeeds.
    ///
    /// # Errors
    /// - `BucketNotEmpty` where the backend refuses to drop contents
    async fn delete_bucket(&self, name: &str) -> Result<()>;

    /// List all buckets visible to this store.
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Write an object, creating any implied nested structure.
    ///
    /// An existing object under the same name is overwritten. An empty
    /// `content_type` is replaced by a guess from the key.
    async fn create_object(&self, name: &str, data: DataSource, content_type: &str) -> Result<()>;

    /// Read a whole object.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite an existing object, keeping its content type.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the object does not exist
    async fn update_object(&self, name: &str, data: DataSource) -> Result<()> {
        let existing = self
            .exists(name)
            .await?
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))?;
        self.create_object(name, data, &existing.content_type).await
    }

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete_object(&self, name: &str) -> Result<()>;

    /// Recursively list the objects of a bucket.
    ///
    /// An empty `bucket` falls back to the bound bucket.
    ///
    /// # Errors
    /// - `InvalidBucketName` if no bucket is named or bound
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMetadata>>;

    /// Probe for an object.
    ///
    /// Absence is `Ok(None)`, never an error.
    async fn exists(&self, name: &str) -> Result<Option<ObjectMetadata>>;

    /// Fetch an object's metadata.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the object does not exist
    async fn metadata(&self, name: &str) -> Result<ObjectMetadata> {
        self.exists(name)
            .await?
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))
    }

    /// Copy an object.
    async fn copy_object(&self, src: &str, dest: &str) -> Result<()>;

    /// Move an object: copy, then delete the source.
    ///
    /// Not atomic. If the delete fails after a successful copy the object
    /// exists at both locations and the delete error is returned. Moving an
    /// object onto itself leaves it in place.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the source does not exist
    async fn move_object(&self, src: &str, dest: &str) -> Result<()> {
        if src == dest {
            self.metadata(src).await?;
            return Ok(());
        }
        self.copy_object(src, dest).await?;
        self.delete_object(src).await
    }

    /// Release backend-held resources. Safe to call more than once.
    async fn cleanup(&self) -> Result<()>;

    /// Validate reachability and configuration without mutating state.
    async fn health_check(&self) -> Result<()>;
}

/// Pick the content type for an upload.
///
/// A non-empty caller value wins; otherwise the key's extension is consulted.
pub fn content_type_for(key: &str, given: &str) -> String {
    if !given.is_empty() {
        return given.to_string();
    }
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Characters left verbatim in an encoded object key.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an object key for use in a copy-source header.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Format a timestamp the way metadata snapshots carry it.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
