//! Controller drivers.
//!
//! Drivers for real controller families live in their own crates and
//! register with [`crate::gateway::DriverRegistry`]; this module carries the
//! in-process ones.

pub mod simulated;
