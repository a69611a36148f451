//! Tag gateway.
//!
//! Clients address values by tag name; the gateway resolves each tag to a
//! controller and device address, batches requests per controller, and
//! merges the answers.
//!
//! - [`config`]: TOML configuration
//! - [`factory`]: driver constructors by type id
//! - [`registry`]: configured controllers and the `default` alias
//! - [`resolver`]: tag name to `(controller, address)`
//! - [`packet`]: per-controller batches
//! - [`executor`]: concurrent read, find and write
//! - [`scheduler`]: subscriptions and poll loops
//! - [`runtime`]: the [`Gateway`] facade

pub mod address;
pub mod config;
pub mod executor;
pub mod factory;
pub mod packet;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod runtime;
pub mod scheduler;

pub use config::{ControllerConfig, GatewayConfig, GatewaySettings, ResolutionMode};
pub use executor::{ReadOutcome, WriteOutcome, WriteReport};
pub use factory::{DriverFactory, DriverRegistry};
pub use registry::{Controller, ControllerRegistry, DEFAULT_ALIAS};
pub use request::TagSelection;
pub use resolver::{ResolvedAddress, TagPacket, TagResolver};
pub use runtime::{Gateway, GatewayBuilder};
pub use scheduler::{
    SubscribeOptions, SubscriptionInfo, SubscriptionToken, SubscriptionUpdate, UpdateHandler,
};
