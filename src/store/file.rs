//! Tag files on disk.

use std::path::Path;

use async_trait::async_trait;

use crate::core::error::{GatewayError, Result};

use super::traits::TagSource;

/// Reads tag alias files with `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TagSource for FileSource {
    async fn read_source(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GatewayError::TagSource {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_source_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Speed=DB1,REAL0").unwrap();

        let text = FileSource::new().read_source(file.path()).await.unwrap();
        assert_eq!(text.trim(), "Speed=DB1,REAL0");
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new()
            .read_source(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TagSource { .. }));
    }
}
