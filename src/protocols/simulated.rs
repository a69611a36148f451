//! In-process simulated controller.
//!
//! A simulated controller does not talk to any device. It keeps an address ->
//! value memory, serves reads for the addresses in its active item set, and
//! applies writes to that memory. Latency and failures can be injected, which
//! is what the gateway tests and the demo use it for.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagw::protocols::simulated::{SimulatedDriver, SimulatedParams};
//!
//! let driver = SimulatedDriver::new(SimulatedParams::default());
//! driver.set_value("DB1,REAL0", 12.5);
//! driver.add_items(&["DB1,REAL0".to_string()]);
//! let items = driver.read_all_items().await?;
//! ```
//!
//! The driver is a cheap handle: clones share the same memory, so a test can
//! keep one clone while the gateway owns another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Deserialize;
use tracing::debug;

use crate::core::data::{DriverValue, Value};
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::{DriverMetadata, HasMetadata, ParameterMetadata, ParameterType};
use crate::core::traits::{ConnectionState, ControllerDriver, ItemValues};

/// Simulated controller parameters (the `parameters` table of a controller entry).
///
/// # Example TOML
/// ```toml
/// [controllers.parameters]
/// latency_ms = 25
///
/// [controllers.parameters.values]
/// "DB1,REAL0" = 12.5
/// "DB1,X4.0" = true
///
/// [controllers.parameters.faults]
/// "MW20" = "BAD_COMM"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatedParams {
    /// Delay applied to every read and write.
    #[serde(default)]
    pub latency_ms: u64,

    /// Initial memory: address -> value.
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,

    /// Addresses that report a non-OK quality code.
    #[serde(default)]
    pub faults: HashMap<String, String>,

    /// Refuse `initiate_connection`.
    #[serde(default)]
    pub fail_connect: bool,

    /// Fail every `read_all_items`.
    #[serde(default)]
    pub fail_reads: bool,

    /// Fail every `write_items`.
    #[serde(default)]
    pub fail_writes: bool,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<ConnectionState>,
    memory: DashMap<String, DriverValue>,
    items: DashSet<String>,
    latency_ms: AtomicU64,
    fail_connect: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Simulated controller driver.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    inner: Arc<Inner>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedParams::default())
    }
}

impl SimulatedDriver {
    pub fn new(params: SimulatedParams) -> Self {
        let memory = DashMap::with_capacity(params.values.len());
        for (address, value) in params.values {
            memory.insert(address, DriverValue::good(value));
        }
        for (address, code) in params.faults {
            let value = memory
                .remove(&address)
                .map(|(_, v)| v.value)
                .unwrap_or_default();
            memory.insert(address, DriverValue::bad(value, code));
        }

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ConnectionState::Disconnected),
                memory,
                items: DashSet::new(),
                latency_ms: AtomicU64::new(params.latency_ms),
                fail_connect: AtomicBool::new(params.fail_connect),
                fail_reads: AtomicBool::new(params.fail_reads),
                fail_writes: AtomicBool::new(params.fail_writes),
                reads: AtomicU64::new(0),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Store a good-quality value.
    pub fn set_value(&self, address: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .memory
            .insert(address.into(), DriverValue::good(value));
    }

    /// Mark an address with a fault quality code, keeping its value.
    pub fn set_quality(&self, address: &str, code: impl Into<String>) {
        let value = self
            .inner
            .memory
            .get(address)
            .map(|v| v.value.clone())
            .unwrap_or_default();
        self.inner
            .memory
            .insert(address.to_string(), DriverValue::bad(value, code));
    }

    /// Current memory content for an address.
    pub fn value(&self, address: &str) -> Option<DriverValue> {
        self.inner.memory.get(address).map(|v| v.value().clone())
    }

    /// Active item set, sorted.
    pub fn active_items(&self) -> Vec<String> {
        let mut items: Vec<String> = self.inner.items.iter().map(|a| a.key().clone()).collect();
        items.sort();
        items
    }

    pub fn is_active(&self, address: &str) -> bool {
        self.inner.items.contains(address)
    }

    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of `read_all_items` calls.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// Number of `write_items` calls.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut guard) = self.inner.state.write() {
            *guard = state;
        }
    }

    async fn simulate_latency(&self) {
        let ms = self.inner.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl HasMetadata for SimulatedDriver {
    fn metadata() -> DriverMetadata {
        DriverMetadata {
            name: "simulated",
            display_name: "Simulated Controller",
            description: "In-process controller with an address memory. Does not connect to physical devices.",
            example_parameters: serde_json::json!({
                "latency_ms": 20,
                "values": { "DB1,REAL0": 12.5, "DB1,X4.0": true },
                "faults": { "MW20": "BAD_COMM" }
            }),
            parameters: vec![
                ParameterMetadata::optional(
                    "latency_ms",
                    "Delay applied to every read and write",
                    ParameterType::Integer,
                    serde_json::json!(0),
                ),
                ParameterMetadata::optional(
                    "values",
                    "Initial address -> value memory",
                    ParameterType::Object,
                    serde_json::json!({}),
                ),
                ParameterMetadata::optional(
                    "faults",
                    "Addresses reporting a non-OK quality code",
                    ParameterType::Object,
                    serde_json::json!({}),
                ),
                ParameterMetadata::optional(
                    "fail_connect",
                    "Refuse to connect",
                    ParameterType::Boolean,
                    serde_json::json!(false),
                ),
                ParameterMetadata::optional(
                    "fail_reads",
                    "Fail every read",
                    ParameterType::Boolean,
                    serde_json::json!(false),
                ),
                ParameterMetadata::optional(
                    "fail_writes",
                    "Fail every write",
                    ParameterType::Boolean,
                    serde_json::json!(false),
                ),
            ],
        }
    }
}

#[async_trait]
impl ControllerDriver for SimulatedDriver {
    fn driver_type(&self) -> &'static str {
        "simulated"
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner
            .state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    async fn initiate_connection(&self, _parameters: &serde_json::Value) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        if self.inner.fail_connect.load(Ordering::Relaxed) {
            self.set_state(ConnectionState::Error);
            return Err(GatewayError::Connection(
                "simulated controller refused connection".into(),
            ));
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    fn add_items(&self, addresses: &[String]) {
        for address in addresses {
            self.inner.items.insert(address.clone());
        }
    }

    fn remove_items(&self, addresses: &[String]) {
        for address in addresses {
            self.inner.items.remove(address);
        }
    }

    async fn read_all_items(&self) -> Result<ItemValues> {
        self.simulate_latency().await;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);

        if self.inner.fail_reads.load(Ordering::Relaxed) {
            return Err(GatewayError::Connection("simulated read failure".into()));
        }

        let mut values = ItemValues::with_capacity(self.inner.items.len());
        for address in self.inner.items.iter() {
            if let Some(value) = self.inner.memory.get(address.key()) {
                values.insert(address.key().clone(), value.value().clone());
            }
        }
        debug!(items = values.len(), "simulated read");
        Ok(values)
    }

    async fn find_item(&self, address: &str) -> Option<DriverValue> {
        if !self.inner.items.contains(address) {
            return None;
        }
        self.value(address)
    }

    async fn write_items(&self, addresses: &[String], values: &[Value]) -> Result<()> {
        if addresses.len() != values.len() {
            return Err(GatewayError::InvalidRequest(format!(
                "{} addresses but {} values",
                addresses.len(),
                values.len()
            )));
        }

        self.simulate_latency().await;
        self.inner.writes.fetch_add(1, Ordering::Relaxed);

        if self.inner.fail_writes.load(Ordering::Relaxed) {
            return Err(GatewayError::Connection("simulated write failure".into()));
        }

        for (address, value) in addresses.iter().zip(values) {
            self.inner
                .memory
                .insert(address.clone(), DriverValue::good(value.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_read_only_active_items() {
        let driver = SimulatedDriver::new(SimulatedParams {
            values: [
                ("A".to_string(), serde_json::json!(1)),
                ("B".to_string(), serde_json::json!(2)),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        });
        driver.initiate_connection(&serde_json::Value::Null).await.unwrap();
        assert_eq!(driver.connection_state(), ConnectionState::Connected);

        driver.add_items(&addrs(&["A", "Missing"]));
        let values = driver.read_all_items().await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["A"], DriverValue::good(1i64));
        assert_eq!(driver.read_count(), 1);
    }

    #[tokio::test]
    async fn test_faults_and_find() {
        let driver = SimulatedDriver::new(SimulatedParams {
            faults: [("MW20".to_string(), "BAD_COMM".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        });

        assert!(driver.find_item("MW20").await.is_none());
        driver.add_items(&addrs(&["MW20"]));
        let found = driver.find_item("MW20").await.unwrap();
        assert_eq!(found.quality.as_str(), "BAD_COMM");

        driver.remove_items(&addrs(&["MW20"]));
        assert!(driver.active_items().is_empty());
    }

    #[tokio::test]
    async fn test_write_updates_memory() {
        let driver = SimulatedDriver::default();
        driver
            .write_items(&addrs(&["X", "Y"]), &[Value::from(1), Value::from("on")])
            .await
            .unwrap();

        assert_eq!(driver.value("Y"), Some(DriverValue::good("on")));
        assert_eq!(driver.write_count(), 1);

        let err = driver.write_items(&addrs(&["X"]), &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let driver = SimulatedDriver::new(SimulatedParams {
            fail_connect: true,
            ..Default::default()
        });
        assert!(driver.initiate_connection(&serde_json::Value::Null).await.is_err());
        assert_eq!(driver.connection_state(), ConnectionState::Error);

        driver.set_fail_reads(true);
        assert!(driver.read_all_items().await.is_err());
        driver.set_fail_writes(true);
        assert!(driver.write_items(&[], &[]).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let driver = SimulatedDriver::default();
        driver.set_latency(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        driver.read_all_items().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_clones_share_memory() {
        let a = SimulatedDriver::default();
        let b = a.clone();
        a.set_value("A", 5);
        assert_eq!(b.value("A"), Some(DriverValue::good(5)));
    }

    #[test]
    fn test_params_from_json() {
        let params: SimulatedParams = serde_json::from_value(serde_json::json!({
            "latency_ms": 10,
            "values": { "DB1,REAL0": 1.5 }
        }))
        .unwrap();
        assert_eq!(params.latency_ms, 10);
        assert_eq!(params.values.len(), 1);
        assert!(!params.fail_reads);
    }
}
