//! Core abstractions for the tag gateway.
//!
//! Values, qualities, errors and the driver capability trait that every
//! controller connection implements.

pub mod data;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod quality;
pub mod traits;

pub use data::*;
pub use error::{GatewayError, Result};
pub use quality::*;
pub use traits::*;
