//! Uniform object storage over heterogeneous backends.
//!
//! This crate provides a single [`Store`] contract that every backend
//! (local filesystem, in-process memory, self-hosted S3-compatible services,
//! cloud S3) implements, and a [`DriverRegistry`] that picks a backend at
//! runtime from a configuration value.
//!
//! # Design Principles
//! - Backend isolation: callers never see native client types or errors
//! - One path policy: every backend resolves names through `split_path`
//! - Async operations: all I/O is async on tokio
//! - Unified error semantics: native failures map onto one closed taxonomy

pub mod config;
pub mod local;
pub mod memory;
pub mod registry;
pub mod scope;
pub mod store;
pub mod stream;

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "minio")]
pub mod minio;

pub use config::{DriverConfig, StoreConfig, DEFAULT_REGION};
pub use local::{FilesystemConfig, LocalStore};
pub use memory::{MemoryConfig, MemoryStore};
pub use registry::{create_default_registry, DriverConstructor, DriverRegistry};
pub use scope::BucketScope;
pub use store::{BucketInfo, ObjectMetadata, Store};
pub use stream::{probe_size, DataSource, SeekableReader};

#[cfg(feature = "aws")]
pub use aws::{AwsConfig, AwsStore};
#[cfg(feature = "minio")]
pub use minio::{MinioConfig, MinioStore};

pub use objstore_common::{Error, Result};
