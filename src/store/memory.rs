//! In-memory tag source using DashMap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::error::{GatewayError, Result};

use super::traits::TagSource;

/// In-memory tag source for tests, demos and embedded configurations.
///
/// Counts reads so callers can check that a source was only consumed once.
///
/// # Example
///
/// ```rust
/// use tagw::store::MemorySource;
///
/// let source = MemorySource::new();
/// source.insert("plc1.txt", "Speed=DB1,REAL0\nRun=DB1,X4.0\n");
/// ```
#[derive(Debug, Default)]
pub struct MemorySource {
    /// path -> source text
    sources: DashMap<PathBuf, String>,
    reads: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a source.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.sources.insert(path.into(), text.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_source(self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Number of successful reads served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TagSource for MemorySource {
    async fn read_source(&self, path: &Path) -> Result<String> {
        let text = self
            .sources
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::TagSource {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such tag source"),
            })?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_read() {
        let source = MemorySource::new().with_source("a.txt", "A=1");

        assert_eq!(source.read_source(Path::new("a.txt")).await.unwrap(), "A=1");
        assert_eq!(source.read_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_source_missing() {
        let source = MemorySource::new();
        let err = source.read_source(Path::new("nope.txt")).await.unwrap_err();
        assert!(matches!(err, GatewayError::TagSource { .. }));
        assert_eq!(source.read_count(), 0);
    }
}
