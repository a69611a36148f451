//! The gateway facade.
//!
//! [`Gateway`] owns the controller registry, the resolver and the
//! subscription scheduler, and exposes the client operations: lookup, read,
//! find, write, subscribe and tag listing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::core::data::{Reading, TagValues, Value};
use crate::core::error::{GatewayError, Result};
use crate::store::{DictionaryStore, FileSource, TagSource};

use super::config::{GatewayConfig, GatewaySettings};
use super::executor::{self, ReadOutcome, WriteOutcome};
use super::factory::DriverRegistry;
use super::packet::ControllerPackets;
use super::registry::{Controller, ControllerRegistry};
use super::request::TagSelection;
use super::resolver::{TagPacket, TagResolver};
use super::scheduler::{
    PollScheduler, SubscribeOptions, SubscriptionInfo, SubscriptionToken, SubscriptionUpdate,
};

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    drivers: DriverRegistry,
    source: Option<Arc<dyn TagSource>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            drivers: DriverRegistry::with_builtin(),
            source: None,
        }
    }

    /// Replace the driver registry (built-in drivers by default).
    #[must_use]
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Replace the tag source (files on disk by default).
    #[must_use]
    pub fn tag_source(mut self, source: Arc<dyn TagSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Validate the configuration and set up every enabled controller.
    ///
    /// Only an invalid configuration is an error; per-controller failures are
    /// logged and available from [`Gateway::setup_errors`].
    pub async fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        let settings = self.config.gateway.clone();

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FileSource::new()) as Arc<dyn TagSource>);
        let store = Arc::new(DictionaryStore::new(
            source,
            settings.tag_file_dir.clone(),
            settings.passthrough_scope,
        ));

        let (registry, setup_errors) =
            ControllerRegistry::build(&self.config, Arc::new(self.drivers), Arc::clone(&store))
                .await;
        let registry = Arc::new(registry);

        info!(
            gateway = %settings.name,
            controllers = registry.len(),
            failed = setup_errors.len(),
            "gateway configured"
        );

        Ok(Gateway {
            resolver: TagResolver::new(Arc::clone(&registry), settings.resolution),
            scheduler: PollScheduler::new(Arc::clone(&registry)),
            settings,
            store,
            registry,
            setup_errors,
        })
    }
}

/// Tag-oriented gateway over a set of controllers.
pub struct Gateway {
    settings: GatewaySettings,
    store: Arc<DictionaryStore>,
    registry: Arc<ControllerRegistry>,
    resolver: TagResolver,
    scheduler: PollScheduler,
    setup_errors: Vec<(String, GatewayError)>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Configure with built-in drivers and tag files on disk.
    pub async fn configure(config: GatewayConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Load a TOML configuration file and configure from it.
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::configure(GatewayConfig::from_file(path)?).await
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn default_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.default_poll_interval_ms)
    }

    /// Controller by id (`default` included).
    pub fn controller(&self, id: &str) -> Option<&Arc<Controller>> {
        self.registry.get(id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Arc<Controller>> {
        self.registry.iter()
    }

    /// Controllers that could not be set up, with the reason.
    pub fn setup_errors(&self) -> &[(String, GatewayError)] {
        &self.setup_errors
    }

    pub fn store(&self) -> &DictionaryStore {
        &self.store
    }

    /// Resolve one tag to its controller and address.
    pub fn lookup(&self, tag: &str) -> Result<TagPacket> {
        self.resolver.resolve(tag)
    }

    /// Resolve and group tags by controller.
    pub fn packets<S: AsRef<str>>(&self, tags: &[S]) -> ControllerPackets {
        ControllerPackets::build(&self.resolver, tags)
    }

    /// Read one tag or many; both forms return one merged map.
    pub async fn read(&self, tags: impl Into<TagSelection>) -> ReadOutcome {
        let tags = tags.into().into_tags();
        let packets = self.packets(&tags);
        executor::read_many(&self.registry, &packets).await
    }

    /// Look up the last values of tags already registered by a read or subscription.
    ///
    /// A single tag that cannot be routed reads as undefined and carries an
    /// [`GatewayError::UnresolvedTag`] error.
    pub async fn find_item(&self, tags: impl Into<TagSelection>) -> ReadOutcome {
        let selection = tags.into();
        if let TagSelection::One(tag) = &selection {
            if let Err(e) = self.routable(tag) {
                return ReadOutcome {
                    error: Some(e),
                    values: TagValues::from([(tag.clone(), Reading::Undefined)]),
                };
            }
        }

        let tags = selection.into_tags();
        let packets = self.packets(&tags);
        executor::find_many(&self.registry, &packets).await
    }

    /// Write one tag.
    ///
    /// Resolution comes before the permission check: a tag that does not
    /// resolve fails with [`GatewayError::UnresolvedTag`] even on a read-only
    /// controller.
    pub async fn write(&self, tag: &str, value: impl Into<Value>) -> Result<()> {
        self.routable(tag)?;
        let items = HashMap::from([(tag.to_string(), value.into())]);
        let outcome = self.write_many(items).await;
        if let Some(e) = outcome.error {
            return Err(e);
        }
        if !outcome.report.unresolved.is_empty() {
            return Err(GatewayError::UnresolvedTag(tag.to_string()));
        }
        Ok(())
    }

    /// Resolve a tag that must reach a device address.
    fn routable(&self, tag: &str) -> Result<TagPacket> {
        let packet = self.resolver.resolve(tag)?;
        if packet.controller.is_empty() || packet.address.is_unresolved() {
            return Err(GatewayError::UnresolvedTag(tag.to_string()));
        }
        Ok(packet)
    }

    /// Write several tags, batched per controller.
    pub async fn write_many(&self, items: HashMap<String, Value>) -> WriteOutcome {
        let tags: Vec<&String> = items.keys().collect();
        let packets = self.packets(&tags);
        executor::write_many(&self.registry, &packets, &items).await
    }

    /// Poll `tags` every `interval`. `None` if the same tag list is already subscribed.
    pub fn subscribe<F>(
        &self,
        tags: impl Into<TagSelection>,
        interval: Duration,
        handler: F,
    ) -> Option<SubscriptionToken>
    where
        F: Fn(SubscriptionUpdate) + Send + Sync + 'static,
    {
        self.subscribe_with(tags, SubscribeOptions::new(interval), handler)
    }

    pub fn subscribe_with<F>(
        &self,
        tags: impl Into<TagSelection>,
        options: SubscribeOptions,
        handler: F,
    ) -> Option<SubscriptionToken>
    where
        F: Fn(SubscriptionUpdate) + Send + Sync + 'static,
    {
        let tags = tags.into().into_tags();
        let token = SubscriptionToken::for_tags(&tags);
        if self.scheduler.contains(&token) {
            return None;
        }

        let packets = self.packets(&tags);
        self.scheduler
            .subscribe(token, tags, &packets, options, Arc::new(handler))
    }

    pub fn unsubscribe(&self, token: impl AsRef<str>) -> Result<()> {
        self.scheduler.unsubscribe(token.as_ref()).map_err(|e| {
            error!("{}", e);
            e
        })
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.scheduler.list()
    }

    /// Every controller's tag table (overlay included), keyed by controller id.
    pub fn all_tags(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.registry
            .iter()
            .map(|c| (c.id().to_string(), c.tags().snapshot()))
            .collect()
    }

    /// Stop all subscriptions.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        info!(gateway = %self.settings.name, "gateway stopped");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.settings.name)
            .field("controllers", &self.registry.ids().collect::<Vec<_>>())
            .field("subscriptions", &self.scheduler.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::traits::ControllerDriver;
    use crate::gateway::config::{ControllerConfig, ResolutionMode};
    use crate::gateway::registry::DEFAULT_ALIAS;
    use crate::protocols::simulated::SimulatedDriver;
    use crate::store::{MemorySource, PassthroughScope};

    const LINE1: &str = "Speed=DB1,REAL0\nRunning=DB1,X4.0\n";
    const LINE2: &str = "Level=MW20\nSpeed=MW0\n";

    /// Register one driver type per handle so tests keep a clone of each.
    fn drivers(handles: &[(&str, &SimulatedDriver)]) -> DriverRegistry {
        let mut registry = DriverRegistry::new();
        for (name, handle) in handles {
            let handle = (*handle).clone();
            registry.register(name, move |_: &ControllerConfig| {
                Ok(Box::new(handle.clone()) as Box<dyn ControllerDriver>)
            });
        }
        registry
    }

    fn source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with_source("tags/line1.txt", LINE1)
                .with_source("tags/line2.txt", LINE2),
        )
    }

    fn settings() -> GatewaySettings {
        GatewaySettings {
            name: "test".into(),
            tag_file_dir: "tags".into(),
            default_controller: Some("line1".into()),
            ..Default::default()
        }
    }

    struct Plant {
        gateway: Gateway,
        line1: SimulatedDriver,
        line2: SimulatedDriver,
    }

    async fn plant(settings: GatewaySettings) -> Plant {
        let line1 = SimulatedDriver::default();
        let line2 = SimulatedDriver::default();
        line1.set_value("DB1,REAL0", 12.5);
        line1.set_value("DB1,X4.0", true);
        line2.set_value("MW20", 870);
        line2.set_value("MW0", 3);

        let config = GatewayConfig::new(settings)
            .with_controller(
                ControllerConfig::new("line1", "sim1", "line1.txt").with_allow_write(true),
            )
            .with_controller(ControllerConfig::new("line2", "sim2", "line2.txt"));

        let gateway = Gateway::builder(config)
            .drivers(drivers(&[("sim1", &line1), ("sim2", &line2)]))
            .tag_source(source())
            .build()
            .await
            .unwrap();

        Plant {
            gateway,
            line1,
            line2,
        }
    }

    #[tokio::test]
    async fn test_read_single_and_batch() {
        let p = plant(settings()).await;

        let one = p.gateway.read("Speed").await.into_result().unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one["Speed"], Reading::Value(Value::Float(12.5)));

        let many = p
            .gateway
            .read(["Speed", "line2/Level", "line2/Speed", "Nope"])
            .await;
        assert!(many.is_ok());
        assert_eq!(many.values["line2/Level"], Reading::Value(Value::Integer(870)));
        assert_eq!(many.values["line2/Speed"], Reading::Value(Value::Integer(3)));
        assert_eq!(many.values["Nope"], Reading::Undefined);
    }

    #[tokio::test]
    async fn test_read_from_json_selection() {
        let p = plant(settings()).await;
        let selection = TagSelection::try_from(serde_json::json!(["Running"])).unwrap();
        let values = p.gateway.read(selection).await.values;
        assert_eq!(values["Running"], Reading::Value(Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_lookup_and_all_tags() {
        let p = plant(settings()).await;

        assert_eq!(
            p.gateway.lookup("line2/Level").unwrap(),
            TagPacket::device("line2", "MW20")
        );
        assert_eq!(p.gateway.controller(DEFAULT_ALIAS).unwrap().id(), "line1");

        let all = p.gateway.all_tags();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["line1", "line2"]);
        assert_eq!(all["line2"]["Level"], "MW20");
    }

    #[tokio::test]
    async fn test_write_permissions() {
        let p = plant(settings()).await;

        p.gateway.write("Speed", 20.0).await.unwrap();
        assert_eq!(
            p.gateway.read("Speed").await.values["Speed"],
            Reading::Value(Value::Float(20.0))
        );

        let err = p.gateway.write("line2/Level", 1).await.unwrap_err();
        assert!(matches!(err, GatewayError::WriteProhibited { .. }));
        assert_eq!(p.line2.write_count(), 0);

        assert!(matches!(
            p.gateway.write("Nope", 1).await,
            Err(GatewayError::UnresolvedTag(_))
        ));
    }

    #[tokio::test]
    async fn test_write_many_partial() {
        let p = plant(settings()).await;
        let items = HashMap::from([
            ("Speed".to_string(), Value::from(1.5)),
            ("Running".to_string(), Value::from(false)),
            ("line2/Level".to_string(), Value::from(5)),
        ]);

        let outcome = p.gateway.write_many(items).await;
        assert_eq!(outcome.report.written, vec!["line1"]);
        assert_eq!(outcome.report.skipped, vec!["line2"]);
        assert!(outcome.error.is_some());
        assert_eq!(p.line1.write_count(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_drops_unresolved() {
        let p = plant(GatewaySettings {
            resolution: ResolutionMode::Strict,
            ..settings()
        })
        .await;

        let outcome = p.gateway.read(["Speed", "Nope"]).await;
        assert_eq!(outcome.values.len(), 1);
        assert!(p.gateway.lookup("Nope").is_err());
    }

    #[tokio::test]
    async fn test_strict_write_rejects_unresolved() {
        let p = plant(GatewaySettings {
            resolution: ResolutionMode::Strict,
            ..settings()
        })
        .await;

        assert!(matches!(
            p.gateway.write("Nope", 1).await,
            Err(GatewayError::UnresolvedTag(t)) if t == "Nope"
        ));
        assert_eq!(p.line1.write_count(), 0);

        let items = HashMap::from([
            ("Speed".to_string(), Value::from(2.0)),
            ("Nope".to_string(), Value::from(1)),
        ]);
        let outcome = p.gateway.write_many(items).await;
        assert_eq!(outcome.report.written, vec!["line1"]);
        assert_eq!(outcome.report.unresolved, vec!["Nope"]);
    }

    #[tokio::test]
    async fn test_find_single_unresolved_errors() {
        let p = plant(settings()).await;

        let outcome = p.gateway.find_item("Nope").await;
        assert!(matches!(outcome.error, Some(GatewayError::UnresolvedTag(ref t)) if t == "Nope"));
        assert_eq!(outcome.values["Nope"], Reading::Undefined);

        let outcome = p.gateway.find_item("line9/Level").await;
        assert!(matches!(outcome.error, Some(GatewayError::UnresolvedTag(_))));

        let batch = p.gateway.find_item(["Speed", "Nope"]).await;
        assert!(batch.is_ok());
        assert_eq!(batch.values["Nope"], Reading::Undefined);
    }

    #[tokio::test]
    async fn test_write_resolves_before_permission_check() {
        let p = plant(settings()).await;

        assert!(matches!(
            p.gateway.write("line2/Nope", 1).await,
            Err(GatewayError::UnresolvedTag(t)) if t == "line2/Nope"
        ));
        assert!(matches!(
            p.gateway.write("line2/Level", 1).await,
            Err(GatewayError::WriteProhibited { .. })
        ));
        assert_eq!(p.line2.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_tag_file_isolated() {
        let config = GatewayConfig::new(settings())
            .with_controller(ControllerConfig::new("line1", "simulated", "line1.txt"))
            .with_controller(ControllerConfig::new("line3", "simulated", "line3.txt"));

        let gateway = Gateway::builder(config)
            .tag_source(source())
            .build()
            .await
            .unwrap();

        assert!(gateway.controller("line1").is_some());
        assert!(gateway.controller("line3").is_none());
        assert_eq!(gateway.setup_errors().len(), 1);
        assert_eq!(gateway.setup_errors()[0].0, "line3");
    }

    async fn shared_source_gateway(scope: PassthroughScope) -> Gateway {
        let config = GatewayConfig::new(GatewaySettings {
            tag_file_dir: "tags".into(),
            passthrough_scope: scope,
            ..Default::default()
        })
        .with_controller(
            ControllerConfig::new("a", "simulated", "line2.txt").with_passthrough(true),
        )
        .with_controller(ControllerConfig::new("b", "simulated", "line2.txt"));

        Gateway::builder(config)
            .tag_source(source())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_passthrough_private_per_controller() {
        let gateway = shared_source_gateway(PassthroughScope::Controller).await;

        assert_eq!(
            gateway.lookup("a/MW100").unwrap(),
            TagPacket::device("a", "MW100")
        );
        assert!(gateway.lookup("b/MW100").unwrap().address.is_unresolved());
        assert!(gateway.all_tags()["a"].contains_key("MW100"));
        assert!(!gateway.all_tags()["b"].contains_key("MW100"));
        assert_eq!(gateway.store().parse_count(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_shared_per_source() {
        let gateway = shared_source_gateway(PassthroughScope::Source).await;

        gateway.lookup("a/MW100").unwrap();
        assert_eq!(
            gateway.lookup("b/MW100").unwrap(),
            TagPacket::device("b", "MW100")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_lifecycle() {
        let p = plant(settings()).await;
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);

        let token = p
            .gateway
            .subscribe(["Speed", "line2/Level"], Duration::from_millis(500), move |u| {
                sink.lock().unwrap().push(u);
            })
            .unwrap();
        assert!(p
            .gateway
            .subscribe(["Speed", "line2/Level"], Duration::from_millis(500), |_| {})
            .is_none());
        assert!(p.line1.is_active("DB1,REAL0"));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        p.gateway.unsubscribe(&token).unwrap();
        assert!(p.gateway.subscriptions().is_empty());

        let updates = updates.lock().unwrap();
        // Three cycles per controller at 0, 500 and 1000 ms.
        assert_eq!(updates.len(), 6);
        assert!(updates.iter().any(|u| {
            u.controller == "line2"
                && u.values["line2/Level"] == Reading::Value(Value::Integer(870))
        }));

        assert!(matches!(
            p.gateway.unsubscribe(&token),
            Err(GatewayError::UnknownSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tags")).unwrap();
        std::fs::write(dir.path().join("tags/plc1.txt"), "Speed=DB1,REAL0\n").unwrap();
        std::fs::write(
            dir.path().join("gateway.toml"),
            r#"
[gateway]
tag_file_dir = "tags"
default_controller = "plc1"

[[controllers]]
name = "plc1"
driver = "simulated"
tagfile = "plc1.txt"

[controllers.parameters.values]
"DB1,REAL0" = 4.5
"#,
        )
        .unwrap();

        let gateway = Gateway::from_config_file(dir.path().join("gateway.toml"))
            .await
            .unwrap();
        let values = gateway.read("Speed").await.into_result().unwrap();
        assert_eq!(values["Speed"], Reading::Value(Value::Float(4.5)));
    }
}
