//! Common types shared by the object storage drivers.
//!
//! This crate holds the pieces every driver must agree on: the closed error
//! taxonomy native errors are normalized onto, and the policy that splits a
//! caller-supplied path into a bucket and an object key.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{resolve_bucket, split_path, validate_bucket_name, ObjectPath, PATH_SEPARATOR};
