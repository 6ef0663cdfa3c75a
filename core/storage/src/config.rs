//! Driver configuration.
//!
//! Each backend has its own typed config struct. The registry only ever sees
//! them through [`DriverConfig`], which exposes the owning driver's name and
//! lets the driver's constructor recover its concrete type.

use serde::{Deserialize, Serialize};
use std::any::Any;

use objstore_common::{Error, Result};

use crate::local::FilesystemConfig;
use crate::memory::MemoryConfig;

#[cfg(feature = "aws")]
use crate::aws::AwsConfig;
#[cfg(feature = "minio")]
use crate::minio::MinioConfig;

/// Region assumed when a configuration leaves it blank.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration value accepted by [`crate::DriverRegistry::resolve`].
pub trait DriverConfig: Send + Sync + 'static {
    /// Name of the driver this configuration belongs to.
    fn driver_name(&self) -> &str;

    /// The concrete configuration, for the driver constructor to downcast.
    fn as_any(&self) -> &dyn Any;
}

/// URL scheme for an endpoint.
pub fn scheme(use_ssl: bool) -> &'static str {
    if use_ssl {
        "https"
    } else {
        "http"
    }
}

/// Downcast an opaque configuration to the type a driver expects.
///
/// # Errors
/// - `ClientInit` if the configuration belongs to another type
pub fn downcast_config<'a, T: 'static>(config: &'a dyn DriverConfig, driver: &str) -> Result<&'a T> {
    config.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::ClientInit(format!(
            "driver '{}' cannot use a configuration for '{}'",
            driver,
            config.driver_name()
        ))
    })
}

/// Configuration document for any compiled-in driver.
///
/// The `driver` field selects the variant:
///
/// ```json
/// { "driver": "filesystem", "base_path": "/var/lib/objects" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Local filesystem.
    Filesystem(FilesystemConfig),
    /// In-process memory.
    Memory(MemoryConfig),
    /// Self-hosted S3-compatible storage.
    #[cfg(feature = "minio")]
    Minio(MinioConfig),
    /// Cloud S3.
    #[cfg(feature = "aws")]
    Aws(AwsConfig),
}

impl StoreConfig {
    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// - `Serialization` if the document is malformed or names an unknown
    ///   driver
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid store config: {}", e)))
    }

    /// Convert an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Serialization(format!("Invalid store config: {}", e)))
    }

    fn inner(&self) -> &dyn DriverConfig {
        match self {
            Self::Filesystem(config) => config,
            Self::Memory(config) => config,
            #[cfg(feature = "minio")]
            Self::Minio(config) => config,
            #[cfg(feature = "aws")]
            Self::Aws(config) => config,
        }
    }
}

impl DriverConfig for StoreConfig {
    fn driver_name(&self) -> &str {
        self.inner().driver_name()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner().as_any()
    }
}
