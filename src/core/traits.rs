//! Core traits for controller drivers.
//!
//! Every controller the gateway talks to is fronted by a driver implementing
//! [`ControllerDriver`]. The capability set is deliberately small and fixed:
//!
//! ```text
//! initiate_connection   open the link using the raw parameter blob
//! add_items             register addresses in the driver's active item set
//! remove_items          drop addresses from the active item set
//! read_all_items        read every active item (value + quality per address)
//! find_item             point lookup of one already-registered address
//! write_items           batched positional write
//! ```
//!
//! The trait uses `async_trait` because the gateway stores drivers as
//! `Box<dyn ControllerDriver>`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::data::{DriverValue, Value};
use crate::core::error::Result;

/// Connection state of a controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected to the target.
    #[default]
    Disconnected,

    /// Attempting to connect.
    Connecting,

    /// Connected and operational.
    Connected,

    /// Connection error state.
    Error,
}

impl ConnectionState {
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// Values returned by `read_all_items`, keyed by raw address.
pub type ItemValues = HashMap<String, DriverValue>;

/// Uniform capability set every controller driver exposes.
///
/// Methods take `&self`: several subscriptions may poll the same controller
/// at once, so drivers keep their item set and link state behind interior
/// mutability.
#[async_trait]
pub trait ControllerDriver: Send + Sync {
    /// Driver type identifier (e.g. `"simulated"`).
    fn driver_type(&self) -> &'static str;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Open the connection using the controller's raw parameter blob.
    async fn initiate_connection(&self, parameters: &serde_json::Value) -> Result<()>;

    /// Add addresses to the active item set. Already present addresses are ignored.
    fn add_items(&self, addresses: &[String]);

    /// Remove addresses from the active item set.
    fn remove_items(&self, addresses: &[String]);

    /// Read every item in the active set.
    ///
    /// Addresses the device could not serve may be absent from the map.
    async fn read_all_items(&self) -> Result<ItemValues>;

    /// Look up the last known value of one registered address.
    async fn find_item(&self, address: &str) -> Option<DriverValue>;

    /// Write `values[i]` to `addresses[i]` in one batch.
    async fn write_items(&self, addresses: &[String], values: &[Value]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Error.to_string(), "Error");
    }
}
