//! Driver metadata catalogue.
//!
//! Built-in drivers describe themselves (name, parameters, an example
//! parameter blob) so the CLI can list them and generate example
//! configuration without instantiating anything.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;

/// Parameter type for driver configuration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
    Float,
    Object,
}

/// Metadata for a single driver parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterMetadata {
    /// Key inside `[controllers.parameters]`.
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub param_type: ParameterType,
}

impl ParameterMetadata {
    /// A required parameter.
    pub const fn required(
        name: &'static str,
        description: &'static str,
        param_type: ParameterType,
    ) -> Self {
        Self {
            name,
            description,
            required: true,
            default_value: None,
            param_type,
        }
    }

    /// An optional parameter with a default value.
    pub fn optional(
        name: &'static str,
        description: &'static str,
        param_type: ParameterType,
        default_value: Value,
    ) -> Self {
        Self {
            name,
            description,
            required: false,
            default_value: Some(default_value),
            param_type,
        }
    }
}

/// Metadata for a driver implementation.
#[derive(Debug, Clone, Serialize)]
pub struct DriverMetadata {
    /// Identifier used in the `driver` key of a controller entry.
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Example `parameters` blob.
    pub example_parameters: Value,
    pub parameters: Vec<ParameterMetadata>,
}

/// Catalogue of built-in drivers.
#[derive(Debug, Default)]
pub struct DriverCatalog {
    drivers: Vec<DriverMetadata>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: DriverMetadata) {
        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> &[DriverMetadata] {
        &self.drivers
    }

    /// Find a driver by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&DriverMetadata> {
        self.drivers
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// Types that can describe themselves.
pub trait HasMetadata {
    fn metadata() -> DriverMetadata;
}

fn build_catalog() -> DriverCatalog {
    use crate::protocols::simulated::SimulatedDriver;

    let mut catalog = DriverCatalog::new();
    catalog.register(SimulatedDriver::metadata());
    catalog
}

static DRIVER_CATALOG: Lazy<DriverCatalog> = Lazy::new(build_catalog);

/// Get the global driver catalogue.
pub fn get_driver_catalog() -> &'static DriverCatalog {
    &DRIVER_CATALOG
}
