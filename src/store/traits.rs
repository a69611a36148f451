//! TagSource trait definition.

use std::path::Path;

use async_trait::async_trait;

use crate::core::error::Result;

/// Where tag dictionaries come from.
///
/// A source is identified by its path; the store reads each distinct path at
/// most once and shares the parsed dictionary between every controller that
/// names it.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Read the whole source as text.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TagSource`](crate::core::error::GatewayError::TagSource)
    /// when the source does not exist or cannot be read.
    async fn read_source(&self, path: &Path) -> Result<String>;
}
