//! Error types for the tag gateway.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is the single [`GatewayError`] enum. Batch operations never abort on the
//! first failure; they carry the first error alongside partial results (see
//! [`crate::gateway::ReadOutcome`]).

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors produced by the gateway and its drivers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A tag source could not be read.
    #[error("cannot read tag source {}: {source}", path.display())]
    TagSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A driver failed to establish its connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was dispatched to a controller that is not registered.
    #[error("controller not found: '{0}'")]
    ControllerNotFound(String),

    /// A tag could not be bound to a controller address.
    #[error("unresolved tag: '{0}'")]
    UnresolvedTag(String),

    /// A write targeted a controller without `allow_write`.
    #[error(
        "writing to '{tag}' on controller '{controller}' prohibited; connection parameter 'allow_write' is disabled"
    )]
    WriteProhibited { controller: String, tag: String },

    /// A driver reported a read or write failure.
    #[error("driver error on controller '{controller}': {message}")]
    Driver { controller: String, message: String },

    /// `unsubscribe` was called with a token that is not active.
    #[error("a valid token must be supplied to remove a subscription (got '{0}')")]
    UnknownSubscription(String),

    /// A request had the wrong shape (e.g. tags that are neither a string nor a list).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal failure (task join errors and the like).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Build a driver error for a controller.
    pub fn driver(controller: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            controller: controller.into(),
            message: message.into(),
        }
    }

    /// Build a write-permission error.
    pub fn write_prohibited(controller: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::WriteProhibited {
            controller: controller.into(),
            tag: tag.into(),
        }
    }

    /// Controller id this error is attributed to, if any.
    pub fn controller(&self) -> Option<&str> {
        match self {
            Self::ControllerNotFound(c) => Some(c),
            Self::WriteProhibited { controller, .. } | Self::Driver { controller, .. } => {
                Some(controller)
            }
            _ => None,
        }
    }
}
