//! Common error types for object storage drivers.

use thiserror::Error;

/// Top-level error type for object storage operations.
///
/// Every driver maps its native errors onto one of these kinds. Native errors
/// with no counterpart here surface as [`Error::Backend`] with the native
/// message preserved.
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint (or base path) missing from the configuration.
    #[error("Invalid endpoint")]
    InvalidEndpoint,

    /// Access key missing from the configuration.
    #[error("Invalid access key")]
    InvalidAccessKey,

    /// Secret key missing from the configuration.
    #[error("Invalid secret key")]
    InvalidSecretKey,

    /// Native client could not be constructed.
    #[error("Client initialization failed: {0}")]
    ClientInit(String),

    /// No driver is registered under the requested name.
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// Empty or malformed bucket name.
    #[error("Invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Empty or malformed object name.
    #[error("Invalid object name: {0:?}")]
    InvalidObjectName(String),

    /// A supplied stream could not be measured.
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// Bucket does not exist.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Object does not exist.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Bucket still has contents.
    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Backend rejected the request on authorization grounds.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Backend-side precondition not met.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Bucket creation collided with an existing bucket.
    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unmapped native backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Map an S3 service error code onto the taxonomy.
    ///
    /// `resource` names the bucket or object the failed request addressed and
    /// is carried in the resulting error. Returns `None` for codes with no
    /// counterpart; callers wrap those as [`Error::Backend`].
    pub fn from_service_code(code: &str, resource: &str) -> Option<Self> {
        let resource = resource.to_string();
        let err = match code {
            "NoSuchBucket" => Self::BucketNotFound(resource),
            "NoSuchKey" | "NotFound" => Self::ObjectNotFound(resource),
            "AccessDenied" | "Forbidden" | "AllAccessDisabled" => Self::AccessDenied(resource),
            "BucketNotEmpty" | "Conflict" => Self::BucketNotEmpty(resource),
            "PreconditionFailed" => Self::PreconditionFailed(resource),
            "BucketAlreadyOwnedByYou" | "BucketAlreadyExists" => {
                Self::BucketAlreadyExists(resource)
            }
            "InvalidBucketName" => Self::InvalidBucketName(resource),
            "InvalidAccessKeyId" => Self::InvalidAccessKey,
            "SignatureDoesNotMatch" => Self::InvalidSecretKey,
            _ => return None,
        };
        Some(err)
    }

    /// Whether this error reports a missing bucket or object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound(_) | Self::ObjectNotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code_mapping() {
        assert!(matches!(
            Error::from_service_code("NoSuchBucket", "photos"),
            Some(Error::BucketNotFound(b)) if b == "photos"
        ));
        assert!(matches!(
            Error::from_service_code("NoSuchKey", "photos/a.png"),
            Some(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            Error::from_service_code("BucketAlreadyOwnedByYou", "photos"),
            Some(Error::BucketAlreadyExists(_))
        ));
        assert!(matches!(
            Error::from_service_code("Conflict", "photos"),
            Some(Error::BucketNotEmpty(_))
        ));
        assert!(matches!(
            Error::from_service_code("InvalidAccessKeyId", ""),
            Some(Error::InvalidAccessKey)
        ));
    }

    #[test]
    fn test_unknown_service_code() {
        assert!(Error::from_service_code("SlowDown", "photos").is_none());
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::ObjectNotFound("k".to_string()).is_not_found());
        assert!(Error::BucketNotFound("b".to_string()).is_not_found());
        assert!(!Error::AccessDenied("b".to_string()).is_not_found());
    }
}
