//! Tag resolution.
//!
//! Maps a client tag name to `(controller id, device address)`:
//!
//! 1. a cached binding is returned as is;
//! 2. a tag in the default controller's table binds there;
//! 3. otherwise the tag must read `controller/remainder`;
//! 4. the remainder is looked up in that controller's table;
//! 5. failing that, a passthrough controller takes the remainder as a literal
//!    address and records it in its overlay;
//! 6. anything left is unresolved: the `UNDF` sentinel in permissive mode,
//!    an error in strict mode.
//!
//! Every binding, sentinel ones included, is cached for the gateway's
//! lifetime. Failures in strict mode are not cached.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::core::data::UNDEFINED;
use crate::core::error::{GatewayError, Result};

use super::address::TagAddress;
use super::config::ResolutionMode;
use super::registry::ControllerRegistry;

/// Device address a tag resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedAddress {
    Device(String),
    /// The `UNDF` sentinel.
    Unresolved,
}

impl ResolvedAddress {
    pub fn as_device(&self) -> Option<&str> {
        match self {
            Self::Device(address) => Some(address),
            Self::Unresolved => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

impl std::fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_device().unwrap_or(UNDEFINED))
    }
}

impl Serialize for ResolvedAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Resolution result for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPacket {
    /// Controller id; empty when the tag named no usable controller.
    pub controller: String,
    pub address: ResolvedAddress,
}

impl TagPacket {
    pub fn device(controller: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            address: ResolvedAddress::Device(address.into()),
        }
    }

    pub fn unresolved(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            address: ResolvedAddress::Unresolved,
        }
    }
}

/// Caching tag resolver.
#[derive(Debug)]
pub struct TagResolver {
    registry: Arc<ControllerRegistry>,
    mode: ResolutionMode,
    cache: DashMap<String, TagPacket>,
}

impl TagResolver {
    pub fn new(registry: Arc<ControllerRegistry>, mode: ResolutionMode) -> Self {
        Self {
            registry,
            mode,
            cache: DashMap::new(),
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Number of cached bindings.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a tag, consulting the cache first.
    pub fn resolve(&self, tag: &str) -> Result<TagPacket> {
        if let Some(packet) = self.cache.get(tag) {
            return Ok(packet.value().clone());
        }

        let packet = self.resolve_uncached(tag)?;
        // A concurrent resolver may have bound the tag first; keep its binding.
        let packet = self
            .cache
            .entry(tag.to_string())
            .or_insert(packet)
            .value()
            .clone();
        Ok(packet)
    }

    fn resolve_uncached(&self, tag: &str) -> Result<TagPacket> {
        if let Some(default) = self.registry.default_controller() {
            if let Some(address) = default.tags().get(tag) {
                return Ok(TagPacket::device(default.id(), address));
            }
        }

        let parsed = TagAddress::parse(tag);
        if !parsed.has_namespace() {
            warn!(tag, "tag not found on default controller and no controller specified");
            return self.unresolved(tag, "");
        }

        let Some(controller) = self.registry.get(parsed.controller) else {
            warn!(tag, controller = parsed.controller, "undefined controller");
            return self.unresolved(tag, parsed.controller);
        };

        if let Some(address) = controller.tags().get(parsed.remainder) {
            debug!(tag, controller = %controller.id(), %address, "resolved");
            return Ok(TagPacket::device(controller.id(), address));
        }

        if controller.passthrough() {
            let address = controller.tags().insert_passthrough(parsed.remainder);
            info!(tag, controller = %controller.id(), "using passthrough address");
            return Ok(TagPacket::device(controller.id(), address));
        }

        warn!(tag, controller = %controller.id(), "tag not found on controller");
        self.unresolved(tag, controller.id())
    }

    fn unresolved(&self, tag: &str, controller: &str) -> Result<TagPacket> {
        match self.mode {
            ResolutionMode::Permissive => Ok(TagPacket::unresolved(controller)),
            ResolutionMode::Strict => Err(GatewayError::UnresolvedTag(tag.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::ControllerConfig;
    use crate::gateway::registry::Controller;
    use crate::protocols::simulated::SimulatedDriver;
    use crate::store::{TagDictionary, TagTable};

    fn table(source: &str, entries: &[(&str, &str)]) -> TagTable {
        let dict: TagDictionary = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TagTable::private(source, Arc::new(dict))
    }

    fn registry() -> Arc<ControllerRegistry> {
        let mut registry = ControllerRegistry::new();
        registry.insert(Controller::new(
            ControllerConfig::new("plc1", "simulated", "plc1.txt"),
            Box::new(SimulatedDriver::default()),
            table("plc1.txt", &[("Speed", "DB1,REAL0")]),
        ));
        registry.insert(Controller::new(
            ControllerConfig::new("plc2", "simulated", "plc2.txt"),
            Box::new(SimulatedDriver::default()),
            table("plc2.txt", &[("Level", "MW20"), ("Speed", "MW0")]),
        ));
        registry.insert(Controller::new(
            ControllerConfig::new("raw", "simulated", "raw.txt").with_passthrough(true),
            Box::new(SimulatedDriver::default()),
            table("raw.txt", &[]),
        ));
        registry.set_default("plc1").unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_default_controller_first() {
        let resolver = TagResolver::new(registry(), ResolutionMode::Permissive);
        assert_eq!(
            resolver.resolve("Speed").unwrap(),
            TagPacket::device("plc1", "DB1,REAL0")
        );
    }

    #[test]
    fn test_namespaced() {
        let resolver = TagResolver::new(registry(), ResolutionMode::Permissive);
        assert_eq!(
            resolver.resolve("plc2/Speed").unwrap(),
            TagPacket::device("plc2", "MW0")
        );
        assert_eq!(
            resolver.resolve("default/Speed").unwrap(),
            TagPacket::device("plc1", "DB1,REAL0")
        );
    }

    #[test]
    fn test_cache_hit_skips_tables() {
        let registry = registry();
        let resolver = TagResolver::new(Arc::clone(&registry), ResolutionMode::Permissive);

        resolver.resolve("plc2/Level").unwrap();
        let plc1 = registry.get("plc1").unwrap().tags().lookup_count();
        let plc2 = registry.get("plc2").unwrap().tags().lookup_count();

        resolver.resolve("plc2/Level").unwrap();
        assert_eq!(registry.get("plc1").unwrap().tags().lookup_count(), plc1);
        assert_eq!(registry.get("plc2").unwrap().tags().lookup_count(), plc2);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_passthrough_records_overlay() {
        let registry = registry();
        let resolver = TagResolver::new(Arc::clone(&registry), ResolutionMode::Permissive);

        assert_eq!(
            resolver.resolve("raw/DB5,INT2").unwrap(),
            TagPacket::device("raw", "DB5,INT2")
        );
        let raw = registry.get("raw").unwrap();
        assert_eq!(raw.tags().get("DB5,INT2").as_deref(), Some("DB5,INT2"));
        assert!(raw.tags().base().is_empty());
    }

    #[test]
    fn test_permissive_sentinel() {
        let resolver = TagResolver::new(registry(), ResolutionMode::Permissive);

        assert_eq!(resolver.resolve("Nope").unwrap(), TagPacket::unresolved(""));
        assert_eq!(
            resolver.resolve("plc2/Nope").unwrap(),
            TagPacket::unresolved("plc2")
        );
        assert_eq!(
            resolver.resolve("plc9/Speed").unwrap(),
            TagPacket::unresolved("plc9")
        );
        // sentinel bindings are cached too
        assert_eq!(resolver.cached(), 3);
    }

    #[test]
    fn test_strict_errors_not_cached() {
        let resolver = TagResolver::new(registry(), ResolutionMode::Strict);

        for tag in ["Nope", "plc2/Nope", "plc9/Speed"] {
            assert!(matches!(
                resolver.resolve(tag),
                Err(GatewayError::UnresolvedTag(t)) if t == tag
            ));
        }
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_no_default_controller() {
        let mut registry = ControllerRegistry::new();
        registry.insert(Controller::new(
            ControllerConfig::new("plc1", "simulated", "plc1.txt"),
            Box::new(SimulatedDriver::default()),
            table("plc1.txt", &[("Speed", "DB1,REAL0")]),
        ));
        let resolver = TagResolver::new(Arc::new(registry), ResolutionMode::Permissive);

        assert!(resolver.resolve("Speed").unwrap().address.is_unresolved());
        assert_eq!(
            resolver.resolve("plc1/Speed").unwrap(),
            TagPacket::device("plc1", "DB1,REAL0")
        );
    }

    #[test]
    fn test_packet_serializes_sentinel() {
        let json = serde_json::to_value(TagPacket::unresolved("plc2")).unwrap();
        assert_eq!(json["controller"], "plc2");
        assert_eq!(json["address"], "UNDF");
    }
}
