//! Bucket and object addressing shared by every driver.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Separator between the bucket and the object key in a fully qualified path.
pub const PATH_SEPARATOR: char = '/';

/// A resolved (bucket, object key) pair.
///
/// Both components are guaranteed non-empty. The key may itself contain
/// separators, which backends treat as nested structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPath {
    bucket: String,
    key: String,
}

impl ObjectPath {
    /// Create a path from explicit components.
    ///
    /// # Errors
    /// - `InvalidBucketName` if `bucket` is empty or contains a separator
    /// - `InvalidObjectName` if `key` is empty
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        validate_bucket_name(&bucket)?;
        if key.is_empty() {
            return Err(Error::InvalidObjectName(key));
        }
        Ok(Self { bucket, key })
    }

    /// Resolve a caller-supplied path against the current bucket context.
    ///
    /// With a bound bucket the whole path is the key, separators included.
    /// Without one the path is split on its first separator into bucket and
    /// key, and both halves must be non-empty.
    ///
    /// # Errors
    /// - `InvalidObjectName` if the path is empty, has no separator while no
    ///   bucket is bound, or yields an empty bucket or key
    pub fn split(current_bucket: Option<&str>, full_path: &str) -> Result<Self> {
        if full_path.is_empty() {
            return Err(Error::InvalidObjectName(String::new()));
        }

        if let Some(bucket) = current_bucket.filter(|b| !b.is_empty()) {
            return Ok(Self {
                bucket: bucket.to_string(),
                key: full_path.to_string(),
            });
        }

        match full_path.split_once(PATH_SEPARATOR) {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(Error::InvalidObjectName(full_path.to_string())),
        }
    }

    /// Bucket component.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key component.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consume the path, returning `(bucket, key)`.
    pub fn into_parts(self) -> (String, String) {
        (self.bucket, self.key)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, PATH_SEPARATOR, self.key)
    }
}

/// Split `full_path` into `(bucket, key)` using the current bucket context.
///
/// See [`ObjectPath::split`].
pub fn split_path(current_bucket: Option<&str>, full_path: &str) -> Result<(String, String)> {
    ObjectPath::split(current_bucket, full_path).map(ObjectPath::into_parts)
}

/// Pick the bucket a bucket-scoped operation targets.
///
/// An explicit non-empty name wins; otherwise the current bucket is used.
///
/// # Errors
/// - `InvalidBucketName` if neither is set
pub fn resolve_bucket(current_bucket: Option<&str>, explicit: &str) -> Result<String> {
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }
    current_bucket
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidBucketName(String::new()))
}

/// Check that a bucket name is usable as a single namespace component.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(Error::InvalidBucketName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_fully_qualified() {
        let (bucket, key) = split_path(None, "bucket/key").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "key");
    }

    #[test]
    fn test_split_keeps_nested_key() {
        let (bucket, key) = split_path(None, "bucket/a/b/c.txt").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "a/b/c.txt");
    }

    #[test]
    fn test_split_rejects_malformed() {
        for path in ["", "onlykey", "bucket/", "/key", "/"] {
            assert!(
                matches!(split_path(None, path), Err(Error::InvalidObjectName(_))),
                "{path:?} should not split"
            );
        }
    }

    #[test]
    fn test_split_empty_current_bucket_is_unset() {
        let (bucket, key) = split_path(Some(""), "b/k").unwrap();
        assert_eq!(bucket, "b");
        assert_eq!(key, "k");
    }

    #[test]
    fn test_split_bound_bucket_rejects_empty_path() {
        assert!(matches!(
            split_path(Some("b"), ""),
            Err(Error::InvalidObjectName(_))
        ));
    }

    #[test]
    fn test_object_path_display() {
        let path = ObjectPath::new("b", "dir/k.txt").unwrap();
        assert_eq!(path.to_string(), "b/dir/k.txt");
    }

    #[test]
    fn test_object_path_new_validates() {
        assert!(matches!(
            ObjectPath::new("", "k"),
            Err(Error::InvalidBucketName(_))
        ));
        assert!(matches!(
            ObjectPath::new("a/b", "k"),
            Err(Error::InvalidBucketName(_))
        ));
        assert!(matches!(
            ObjectPath::new("b", ""),
            Err(Error::InvalidObjectName(_))
        ));
    }

    #[test]
    fn test_resolve_bucket() {
        assert_eq!(resolve_bucket(Some("cur"), "explicit").unwrap(), "explicit");
        assert_eq!(resolve_bucket(Some("cur"), "").unwrap(), "cur");
        assert!(matches!(
            resolve_bucket(None, ""),
            Err(Error::InvalidBucketName(_))
        ));
        assert!(matches!(
            resolve_bucket(Some(""), ""),
            Err(Error::InvalidBucketName(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_bound_bucket_is_verbatim(bucket in "[a-z0-9-]{1,16}", path in "[a-z0-9/._-]{1,40}") {
            let (b, k) = split_path(Some(&bucket), &path).unwrap();
            prop_assert_eq!(b, bucket);
            prop_assert_eq!(k, path);
        }

        #[test]
        fn prop_unbound_split_round_trips(bucket in "[a-z0-9-]{1,16}", key in "[a-z0-9._-][a-z0-9/._-]{0,30}") {
            let full = format!("{bucket}/{key}");
            let path = ObjectPath::split(None, &full).unwrap();
            prop_assert_eq!(path.bucket(), bucket.as_str());
            prop_assert_eq!(path.key(), key.as_str());
            prop_assert_eq!(path.to_string(), full);
        }
    }
}
