//! Driver registry for runtime backend selection.

use std::collections::HashMap;
use tracing::{debug, info};

use objstore_common::{Error, Result};

use crate::config::DriverConfig;
use crate::store::Store;

/// Constructor turning an opaque configuration into a store.
pub type DriverConstructor = Box<dyn Fn(&dyn DriverConfig) -> Result<Box<dyn Store>> + Send + Sync>;

/// Registry mapping driver names to constructors.
///
/// Backends register themselves through their module's `register` function;
/// [`create_default_registry`] is the bootstrap step that registers every
/// compiled-in backend. Tests can build an isolated registry with
/// [`DriverRegistry::new`].
pub struct DriverRegistry {
    drivers: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver constructor.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, constructor: DriverConstructor) {
        let name = name.into();
        if self.drivers.insert(name.clone(), constructor).is_some() {
            debug!(driver = %name, "Replaced registered driver");
        } else {
            debug!(driver = %name, "Registered driver");
        }
    }

    /// Build a store for `config` using the driver it names.
    ///
    /// The registry does not validate the configuration; that is the
    /// constructor's job, and its result is returned unchanged.
    ///
    /// # Errors
    /// - `UnknownDriver` if no driver is registered under the config's name
    /// - Whatever the driver's constructor reports
    pub fn resolve(&self, config: &dyn DriverConfig) -> Result<Box<dyn Store>> {
        let name = config.driver_name();
        let constructor = self
            .drivers
            .get(name)
            .ok_or_else(|| Error::UnknownDriver(name.to_string()))?;
        constructor(config)
    }

    /// Resolve a store, then run its setup and health check.
    pub async fn open(&self, config: &dyn DriverConfig) -> Result<Box<dyn Store>> {
        let store = self.resolve(config)?;
        store.setup().await?;
        store.health_check().await?;
        info!(driver = %store.driver_name(), "Store ready");
        Ok(store)
    }

    /// Get the names of registered drivers.
    pub fn drivers(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Check if a driver is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with every compiled-in driver.
pub fn create_default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();

    crate::local::register(&mut registry);
    crate::memory::register(&mut registry);

    #[cfg(feature = "minio")]
    crate::minio::register(&mut registry);

    #[cfg(feature = "aws")]
    crate::aws::register(&mut registry);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConfig, MemoryStore};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NamedConfig(&'static str);

    impl DriverConfig for NamedConfig {
        fn driver_name(&self) -> &str {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn counting_constructor(calls: Arc<AtomicUsize>) -> DriverConstructor {
        Box::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemoryStore::new()) as Box<dyn Store>)
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = DriverRegistry::new();
        registry.register("x", counting_constructor(calls.clone()));

        let store = registry.resolve(&NamedConfig("x")).unwrap();
        assert_eq!(store.driver_name(), "memory");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_constructor_error_passes_through() {
        let mut registry = DriverRegistry::new();
        registry.register("broken", Box::new(|_| Err(Error::InvalidEndpoint)));

        let result = registry.resolve(&NamedConfig("broken"));
        assert!(matches!(result, Err(Error::InvalidEndpoint)));
    }

    #[test]
    fn test_later_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = DriverRegistry::new();
        registry.register("x", counting_constructor(first.clone()));
        registry.register("x", counting_constructor(second.clone()));

        registry.resolve(&NamedConfig("x")).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.drivers().len(), 1);
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = DriverRegistry::new();
        registry.register("x", counting_constructor(calls.clone()));

        let result = registry.resolve(&NamedConfig("y"));
        assert!(matches!(result, Err(Error::UnknownDriver(name)) if name == "y"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drivers_list() {
        let mut registry = DriverRegistry::new();
        registry.register("a", Box::new(|_| Ok(Box::new(MemoryStore::new()) as Box<dyn Store>)));
        registry.register("b", Box::new(|_| Ok(Box::new(MemoryStore::new()) as Box<dyn Store>)));

        let drivers = registry.drivers();
        assert!(drivers.contains(&"a".to_string()));
        assert!(drivers.contains(&"b".to_string()));
        assert!(registry.has_driver("a"));
        assert!(!registry.has_driver("c"));
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert!(registry.has_driver("filesystem"));
        assert!(registry.has_driver("memory"));
        #[cfg(feature = "minio")]
        assert!(registry.has_driver("minio"));
        #[cfg(feature = "aws")]
        assert!(registry.has_driver("aws"));
    }

    #[tokio::test]
    async fn test_open_runs_health_check() {
        let registry = create_default_registry();
        let store = registry.open(&MemoryConfig::default()).await.unwrap();
        assert_eq!(store.driver_name(), "memory");
        assert!(store.bucket().is_none());
    }
}
