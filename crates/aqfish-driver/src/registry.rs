use std::collections::HashMap;
use std::sync::Arc;

use aqfish_domain::Definition;

use crate::driver::Driver;
use crate::error::DriverError;

/// Dispatches driver calls to the correct named [`Driver`] instance.
///
/// A Definition's `provider` (and optional `instance`) resolves to a
/// registry key via [`Definition::driver_key`]; multiple instances of one
/// driver kind (`test`, `test/dev`, `test/prod`) are distinct entries (§4.4).
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under `key` (typically `provider` or
    /// `provider/instance`). Returns `&mut self` for chaining.
    pub fn register(&mut self, key: impl Into<String>, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(key.into(), driver);
        self
    }

    /// Resolve the driver for `definition` via its `driver_key()`.
    pub fn for_definition(&self, definition: &Definition) -> Result<Arc<dyn Driver>, DriverError> {
        self.for_key(&definition.driver_key())
    }

    pub fn for_key(&self, key: &str) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::NotConfigured(key.to_string()))
    }

    /// All registered driver keys.
    pub fn keys(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::TestDriver;

    #[test]
    fn resolves_registered_instance() {
        let mut registry = DriverRegistry::new();
        registry.register("test/dev", Arc::new(TestDriver::new("dev")));

        let definition = Definition {
            provider: "test".into(),
            instance: Some("dev".into()),
            resources: aqfish_domain::ResourceRequest::default(),
            options: serde_json::Value::Null,
        };
        assert!(registry.for_definition(&definition).is_ok());
    }

    #[test]
    fn missing_driver_errors() {
        let registry = DriverRegistry::new();
        let definition = Definition {
            provider: "missing".into(),
            instance: None,
            resources: aqfish_domain::ResourceRequest::default(),
            options: serde_json::Value::Null,
        };
        assert!(matches!(
            registry.for_definition(&definition),
            Err(DriverError::NotConfigured(_))
        ));
    }
}
