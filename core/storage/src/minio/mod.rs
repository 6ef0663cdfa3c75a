//! Self-hosted S3-compatible store (MinIO, Ceph RGW, SeaweedFS, ...).
//!
//! This module provides a backend over the `rust-s3` client with:
//! - Static credentials and a custom endpoint, path-style by default
//! - Streaming uploads sized up front through the stream prober
//! - Native S3 error codes normalized onto the shared taxonomy

pub mod error;
pub mod provider;

pub use provider::{MinioConfig, MinioStore, DRIVER_NAME};

use crate::config::downcast_config;
use crate::registry::DriverRegistry;
use crate::store::Store;

/// Register the S3-compatible driver.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(
        DRIVER_NAME,
        Box::new(|config| {
            let config = downcast_config::<MinioConfig>(config, DRIVER_NAME)?;
            Ok(Box::new(MinioStore::new(config.clone())?) as Box<dyn Store>)
        }),
    );
}
