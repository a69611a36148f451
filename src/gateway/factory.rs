//! Driver factory.
//!
//! Maps a driver type identifier (the `driver` key of a controller entry) to a
//! constructor producing a [`ControllerDriver`]. Drivers are resolved once, at
//! configuration time.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{GatewayError, Result};
use crate::core::traits::ControllerDriver;

use super::config::ControllerConfig;

/// Constructor for one driver type.
pub type DriverFactory =
    Arc<dyn Fn(&ControllerConfig) -> Result<Box<dyn ControllerDriver>> + Send + Sync>;

/// Registry of driver constructors keyed by lowercase type identifier.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in driver registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simulated", create_simulated_driver);
        registry
    }

    /// Register (or replace) a driver type.
    pub fn register<F>(&mut self, driver_type: &str, factory: F)
    where
        F: Fn(&ControllerConfig) -> Result<Box<dyn ControllerDriver>> + Send + Sync + 'static,
    {
        self.factories
            .insert(driver_type.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_driver<F>(mut self, driver_type: &str, factory: F) -> Self
    where
        F: Fn(&ControllerConfig) -> Result<Box<dyn ControllerDriver>> + Send + Sync + 'static,
    {
        self.register(driver_type, factory);
        self
    }

    pub fn contains(&self, driver_type: &str) -> bool {
        self.factories
            .contains_key(&driver_type.to_ascii_lowercase())
    }

    /// Registered driver type identifiers, sorted.
    pub fn driver_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create the driver for a controller.
    pub fn create(&self, config: &ControllerConfig) -> Result<Box<dyn ControllerDriver>> {
        let factory = self
            .factories
            .get(&config.driver.to_ascii_lowercase())
            .ok_or_else(|| {
                GatewayError::Config(format!(
                    "Unsupported driver: {} (controller {})",
                    config.driver, config.name
                ))
            })?;
        factory(config)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn create_simulated_driver(config: &ControllerConfig) -> Result<Box<dyn ControllerDriver>> {
    use crate::protocols::simulated::{SimulatedDriver, SimulatedParams};

    let params: SimulatedParams = if config.parameters.is_null() {
        SimulatedParams::default()
    } else {
        serde_json::from_value(config.parameters.clone()).map_err(|e| {
            GatewayError::Config(format!(
                "Invalid simulated parameters for {}: {}",
                config.name, e
            ))
        })?
    };

    Ok(Box::new(SimulatedDriver::new(params)))
}
