//! Controller registry.
//!
//! Built once from configuration and read-only afterwards. Every enabled
//! controller gets a driver, a tag table and a connection attempt; a
//! controller whose driver or tag source cannot be set up is left out and the
//! failure is reported, without affecting the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::core::error::{GatewayError, Result};
use crate::core::traits::ControllerDriver;
use crate::store::{DictionaryStore, TagTable};

use super::config::{ControllerConfig, GatewayConfig};
use super::factory::DriverRegistry;

/// Id under which the default controller is also reachable.
pub const DEFAULT_ALIAS: &str = "default";

/// One configured controller: driver, settings and tag table.
pub struct Controller {
    driver: Box<dyn ControllerDriver>,
    config: ControllerConfig,
    tags: TagTable,
}

impl Controller {
    pub fn new(config: ControllerConfig, driver: Box<dyn ControllerDriver>, tags: TagTable) -> Self {
        Self {
            driver,
            config,
            tags,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.name
    }

    pub fn driver(&self) -> &dyn ControllerDriver {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    pub fn allow_write(&self) -> bool {
        self.config.allow_write
    }

    pub fn passthrough(&self) -> bool {
        self.config.tag_passthrough
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.config.name)
            .field("driver", &self.driver.driver_type())
            .field("state", &self.driver.connection_state())
            .field("tagfile", &self.tags.source())
            .finish()
    }
}

/// Registered controllers by id, plus the `default` alias.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Arc<Controller>>,
    default: Option<Arc<Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller, replacing any with the same id.
    pub fn insert(&mut self, controller: Controller) -> Arc<Controller> {
        let controller = Arc::new(controller);
        self.controllers
            .insert(controller.id().to_string(), Arc::clone(&controller));
        controller
    }

    /// Alias a registered controller as `default`.
    pub fn set_default(&mut self, id: &str) -> Result<()> {
        let controller = self
            .controllers
            .get(id)
            .ok_or_else(|| GatewayError::ControllerNotFound(id.to_string()))?;
        self.default = Some(Arc::clone(controller));
        Ok(())
    }

    /// Look up by id; `default` resolves to the aliased controller.
    pub fn get(&self, id: &str) -> Option<&Arc<Controller>> {
        if id == DEFAULT_ALIAS {
            return self.default.as_ref();
        }
        self.controllers.get(id)
    }

    pub fn default_controller(&self) -> Option<&Arc<Controller>> {
        self.default.as_ref()
    }

    /// Registered controllers in id order (the alias is not repeated).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Controller>> {
        self.controllers.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Build the registry for every enabled controller, set up concurrently.
    ///
    /// Returns the registry and the per-controller setup failures. A failed
    /// connection attempt is reported but the controller stays registered;
    /// a missing driver or unreadable tag source leaves it out.
    pub async fn build(
        config: &GatewayConfig,
        drivers: Arc<DriverRegistry>,
        store: Arc<DictionaryStore>,
    ) -> (Self, Vec<(String, GatewayError)>) {
        let mut registry = Self::new();
        let mut failures = Vec::new();

        let mut set = JoinSet::new();
        for ctrl in config.enabled_controllers() {
            let ctrl = ctrl.clone();
            let drivers = Arc::clone(&drivers);
            let store = Arc::clone(&store);
            set.spawn(async move {
                let name = ctrl.name.clone();
                (name, setup_controller(ctrl, &drivers, &store).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok((controller, None)))) => {
                    info!(controller = %controller.id(), "controller ready");
                    registry.insert(controller);
                }
                Ok((name, Ok((controller, Some(err))))) => {
                    error!(controller = %name, "connection failed: {}", err);
                    registry.insert(controller);
                    failures.push((name, err));
                }
                Ok((name, Err(err))) => {
                    error!(controller = %name, "controller setup failed: {}", err);
                    failures.push((name, err));
                }
                Err(e) => {
                    error!("controller setup task failed: {}", e);
                    failures.push((String::new(), GatewayError::Internal(e.to_string())));
                }
            }
        }

        if let Some(name) = config.gateway.default_controller.as_deref() {
            if registry.set_default(name).is_err() {
                warn!(controller = %name, "default controller is not available");
            }
        }

        debug!(controllers = registry.len(), "controller registry built");
        (registry, failures)
    }
}

/// Create the driver and tag table, then try to connect.
///
/// The inner error is the connection failure, if any.
async fn setup_controller(
    config: ControllerConfig,
    drivers: &DriverRegistry,
    store: &DictionaryStore,
) -> Result<(Controller, Option<GatewayError>)> {
    let driver = drivers.create(&config)?;
    let tags = store.table_for(&config.tagfile).await?;
    debug!(
        controller = %config.name,
        tags = tags.base().len(),
        "tag table loaded"
    );

    let connected = driver.initiate_connection(&config.parameters).await;
    Ok((Controller::new(config, driver, tags), connected.err()))
}
