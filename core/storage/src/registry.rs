//! Driver registry for selecting a backend by name at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::StorageDriver;
use filestore_common::{Error, Result};

/// Factory function type for creating drivers.
pub type DriverFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageDriver>> + Send + Sync>;

/// Backend selection as supplied by an operator.
///
/// `options` is handed verbatim to the backend's factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Registered driver name (e.g., "local", "gcs", "s3").
    pub backend: String,
    /// Driver-specific configuration.
    #[serde(default)]
    pub options: Value,
}

/// Registry for storage driver factories.
///
/// Allows registration and resolution of storage drivers by name and
/// configuration.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Errors
    /// - `AlreadyExists` if the name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Driver '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a driver by name and configuration.
    ///
    /// # Errors
    /// - `NotFound` if no driver is registered under `name`
    /// - `InvalidArgument` if the configuration is invalid for the driver
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StorageDriver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Driver '{}' is not registered", name)))?;
        factory(config)
    }

    /// Resolve the driver a [`StoreConfig`] selects.
    pub fn open(&self, config: &StoreConfig) -> Result<Arc<dyn StorageDriver>> {
        self.resolve(&config.backend, config.options.clone())
    }

    /// Register a built-in factory, replacing any previous one.
    fn insert_builtin(&mut self, name: &str, factory: DriverFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Get sorted list of registered driver names.
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a driver is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in drivers.
///
/// `http` is the process-wide HTTP client shared by every HTTP-backed
/// driver the registry creates.
pub fn create_default_registry(http: reqwest::Client) -> DriverRegistry {
    let mut registry = DriverRegistry::new();

    // In-memory object store (for testing)
    registry.insert_builtin(
        "memory",
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryDriver::new()))),
    );

    // Local filesystem driver
    registry.insert_builtin(
        "local",
        Box::new(|config| {
            let root = config
                .get("root")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::InvalidArgument("Local driver requires 'root' path".to_string()))?;
            Ok(Arc::new(crate::local::LocalDriver::new(root)?))
        }),
    );

    // Object stores
    registry.insert_builtin("s3", Box::new(crate::s3::create_s3_driver));
    registry.insert_builtin(
        "gcs",
        Box::new(move |config| crate::gcs::create_gcs_driver(http.clone(), config)),
    );

    registry
}
