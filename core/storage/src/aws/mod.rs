//! Cloud S3 store.
//!
//! Built on the official `aws-sdk-s3` client with static credentials, an
//! optional endpoint override and paginated listings.

pub mod error;
pub mod provider;

pub use provider::{AwsConfig, AwsStore, DRIVER_NAME};

use crate::config::downcast_config;
use crate::registry::DriverRegistry;
use crate::store::Store;

/// Register the cloud S3 driver.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(
        DRIVER_NAME,
        Box::new(|config| {
            let config = downcast_config::<AwsConfig>(config, DRIVER_NAME)?;
            Ok(Box::new(AwsStore::new(config.clone())?) as Box<dyn Store>)
        }),
    );
}
