//! Gateway configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [gateway]
//! name = "Plant gateway"
//! tag_file_dir = "tags"
//! default_controller = "plc1"
//!
//! [[controllers]]
//! name = "plc1"
//! driver = "simulated"
//! tagfile = "plc1.txt"
//! allow_write = true
//!
//! [controllers.parameters]
//! latency_ms = 20
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{GatewayError, Result};
use crate::store::PassthroughScope;

/// How the resolver treats tags it cannot bind to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Unresolved tags resolve to the `UNDF` sentinel and travel with the batch.
    #[default]
    Permissive,

    /// Unresolved tags are errors and are dropped from batches.
    Strict,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

/// Gateway-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory tag files are resolved against.
    #[serde(default)]
    pub tag_file_dir: PathBuf,

    /// Controller aliased as `default`.
    #[serde(default)]
    pub default_controller: Option<String>,

    #[serde(default)]
    pub resolution: ResolutionMode,

    #[serde(default)]
    pub passthrough_scope: PassthroughScope,

    /// Poll interval used when a caller does not give one.
    #[serde(default = "default_poll_interval_ms")]
    pub default_poll_interval_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            tag_file_dir: PathBuf::new(),
            default_controller: None,
            resolution: ResolutionMode::default(),
            passthrough_scope: PassthroughScope::default(),
            default_poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_name() -> String {
    "tagw".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// One controller connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller id, also the namespace prefix in `id/tag` addressing.
    pub name: String,

    /// Driver type identifier looked up in the driver registry.
    pub driver: String,

    /// Tag file, relative to `tag_file_dir`.
    pub tagfile: PathBuf,

    #[serde(default)]
    pub allow_write: bool,

    /// Treat unknown tag names as literal addresses.
    #[serde(default)]
    pub tag_passthrough: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Driver-specific parameters, handed to the driver verbatim.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ControllerConfig {
    pub fn new(
        name: impl Into<String>,
        driver: impl Into<String>,
        tagfile: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            tagfile: tagfile.into(),
            allow_write: false,
            tag_passthrough: false,
            enabled: true,
            parameters: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_allow_write(mut self, allow: bool) -> Self {
        self.allow_write = allow;
        self
    }

    #[must_use]
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.tag_passthrough = passthrough;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

impl GatewayConfig {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            gateway: settings,
            controllers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// A relative `tag_file_dir` is taken relative to the config file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)?;

        if config.gateway.tag_file_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.gateway.tag_file_dir = parent.join(&config.gateway.tag_file_dir);
            }
        }
        Ok(config)
    }

    /// Reject empty and duplicate controller names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.controllers.len());
        for ctrl in &self.controllers {
            if ctrl.name.is_empty() {
                return Err(GatewayError::Config("controller name must not be empty".into()));
            }
            if ctrl.name == super::registry::DEFAULT_ALIAS {
                return Err(GatewayError::Config(format!(
                    "controller name '{}' is reserved",
                    ctrl.name
                )));
            }
            if !seen.insert(ctrl.name.as_str()) {
                return Err(GatewayError::Config(format!(
                    "duplicate controller name: {}",
                    ctrl.name
                )));
            }
        }
        Ok(())
    }

    /// Controllers with `enabled = true`.
    pub fn enabled_controllers(&self) -> impl Iterator<Item = &ControllerConfig> {
        self.controllers.iter().filter(|c| c.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[gateway]
name = "Plant"
tag_file_dir = "tags"
default_controller = "plc1"
resolution = "strict"
passthrough_scope = "source"

[[controllers]]
name = "plc1"
driver = "simulated"
tagfile = "plc1.txt"
allow_write = true

[controllers.parameters]
latency_ms = 20

[[controllers]]
name = "plc2"
driver = "simulated"
tagfile = "plc2.txt"
tag_passthrough = true
enabled = false
"#;

    #[test]
    fn test_parse_sample() {
        let config = GatewayConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.gateway.name, "Plant");
        assert_eq!(config.gateway.default_controller.as_deref(), Some("plc1"));
        assert_eq!(config.gateway.resolution, ResolutionMode::Strict);
        assert_eq!(config.gateway.passthrough_scope, PassthroughScope::Source);
        assert_eq!(config.gateway.default_poll_interval_ms, 1000);

        assert_eq!(config.controllers.len(), 2);
        let plc1 = &config.controllers[0];
        assert!(plc1.allow_write);
        assert!(!plc1.tag_passthrough);
        assert_eq!(plc1.parameters["latency_ms"], 20);

        let enabled: Vec<_> = config.enabled_controllers().map(|c| c.name.as_str()).collect();
        assert_eq!(enabled, vec!["plc1"]);
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_toml_str("[gateway]\n").unwrap();
        assert_eq!(config.gateway.resolution, ResolutionMode::Permissive);
        assert_eq!(config.gateway.passthrough_scope, PassthroughScope::Controller);
        assert!(config.controllers.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = GatewayConfig::new(GatewaySettings::default())
            .with_controller(ControllerConfig::new("a", "simulated", "a.txt"))
            .with_controller(ControllerConfig::new("a", "simulated", "b.txt"));
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_reserved_name_rejected() {
        let config = GatewayConfig::new(GatewaySettings::default())
            .with_controller(ControllerConfig::new("default", "simulated", "a.txt"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_relative_tag_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(config.gateway.tag_file_dir, dir.path().join("tags"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            GatewayConfig::from_toml_str("[gateway"),
            Err(GatewayError::Config(_))
        ));
    }
}
