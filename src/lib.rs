//! # Tag Gateway (tagw)
//!
//! A tag-oriented aggregation gateway for industrial controllers. Clients
//! read, write and subscribe to values by symbolic tag name; the gateway
//! resolves each tag to a controller and device address, batches requests
//! per controller, and merges the answers.
//!
//! ## Features
//!
//! - **Tag resolution**: default controller first, then `controller/tag`
//!   addressing, with optional literal-address passthrough
//! - **Batching**: one request per controller, run concurrently
//! - **Failure isolation**: a failing controller only blanks its own tags
//! - **Subscriptions**: drift-compensated poll loops, deduplicated by tag list
//! - **Pluggable drivers**: anything implementing [`ControllerDriver`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagw::prelude::*;
//!
//! let gateway = Gateway::from_config_file("gateway.toml").await?;
//!
//! let values = gateway.read(["Speed", "line2/Level"]).await.into_result()?;
//! gateway.write("Setpoint", 42.0).await?;
//!
//! let token = gateway.subscribe(["Speed"], Duration::from_millis(500), |update| {
//!     println!("{:?}", update.values);
//! });
//! ```
//!
//! ## Tag files
//!
//! Each controller names a tag file of `name=address` lines:
//!
//! ```text
//! Speed=DB1,REAL0
//! Running=DB1,X4.0
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod gateway;
pub mod protocols;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        data::*,
        error::{GatewayError, Result},
        quality::*,
        traits::*,
    };
    pub use crate::gateway::{
        ControllerConfig, DriverRegistry, Gateway, GatewayConfig, GatewaySettings, ReadOutcome,
        ResolutionMode, SubscribeOptions, SubscriptionToken, SubscriptionUpdate, TagSelection,
        WriteOutcome,
    };
    pub use crate::store::{FileSource, MemorySource, PassthroughScope, TagSource};
    pub use std::time::Duration;
}

// Re-export core types at crate root for convenience
pub use crate::core::data::{DriverValue, Reading, TagValues, Value, UNDEFINED};
pub use crate::core::error::{GatewayError, Result};
pub use crate::core::quality::Quality;
pub use crate::core::traits::{ConnectionState, ControllerDriver, ItemValues};

pub use crate::gateway::{Gateway, GatewayConfig};
