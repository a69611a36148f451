//! Process-scoped dictionary cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::core::error::Result;

use super::dictionary::{Overlay, PassthroughScope, TagDictionary, TagTable};
use super::traits::TagSource;

/// A parsed source plus the overlay shared under [`PassthroughScope::Source`].
#[derive(Debug)]
struct LoadedSource {
    dictionary: Arc<TagDictionary>,
    shared_overlay: Overlay,
}

/// Loads tag sources once per path and hands out tag tables.
///
/// Concurrent first requests for the same path wait on a single load; a failed
/// load is not cached, so a later request retries.
pub struct DictionaryStore {
    source: Arc<dyn TagSource>,
    root: PathBuf,
    scope: PassthroughScope,
    loaded: DashMap<PathBuf, Arc<OnceCell<Arc<LoadedSource>>>>,
    parses: AtomicU64,
}

impl DictionaryStore {
    /// Create a store reading relative paths under `root`.
    pub fn new(source: Arc<dyn TagSource>, root: impl Into<PathBuf>, scope: PassthroughScope) -> Self {
        Self {
            source,
            root: root.into(),
            scope,
            loaded: DashMap::new(),
            parses: AtomicU64::new(0),
        }
    }

    /// Full path for a tag file name.
    pub fn resolve_path(&self, tagfile: impl AsRef<Path>) -> PathBuf {
        self.root.join(tagfile)
    }

    pub fn scope(&self) -> PassthroughScope {
        self.scope
    }

    /// Load (or reuse) the dictionary for a tag file.
    pub async fn load(&self, tagfile: impl AsRef<Path>) -> Result<Arc<TagDictionary>> {
        let loaded = self.load_source(&self.resolve_path(tagfile)).await?;
        Ok(Arc::clone(&loaded.dictionary))
    }

    /// Build the tag table a controller resolves against.
    pub async fn table_for(&self, tagfile: impl AsRef<Path>) -> Result<TagTable> {
        let path = self.resolve_path(tagfile);
        let loaded = self.load_source(&path).await?;
        let overlay = match self.scope {
            PassthroughScope::Controller => Overlay::default(),
            PassthroughScope::Source => Arc::clone(&loaded.shared_overlay),
        };
        Ok(TagTable::new(path, Arc::clone(&loaded.dictionary), overlay))
    }

    /// Number of sources actually parsed.
    pub fn parse_count(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }

    /// Number of distinct sources cached.
    pub fn len(&self) -> usize {
        self.loaded.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn load_source(&self, path: &Path) -> Result<Arc<LoadedSource>> {
        // Clone the cell out so the map shard is not locked across the await.
        let cell = Arc::clone(self.loaded.entry(path.to_path_buf()).or_default().value());

        let loaded = cell
            .get_or_try_init(|| async {
                let text = self.source.read_source(path).await?;
                let dictionary = TagDictionary::parse(&text);
                self.parses.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), tags = dictionary.len(), "loaded tag source");
                Ok::<_, crate::core::error::GatewayError>(Arc::new(LoadedSource {
                    dictionary: Arc::new(dictionary),
                    shared_overlay: Overlay::default(),
                }))
            })
            .await?;

        Ok(Arc::clone(loaded))
    }
}

impl std::fmt::Debug for DictionaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictionaryStore")
            .field("root", &self.root)
            .field("scope", &self.scope)
            .field("sources", &self.loaded.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GatewayError;
    use crate::store::MemorySource;

    fn store_with(scope: PassthroughScope) -> (Arc<MemorySource>, DictionaryStore) {
        let source = Arc::new(
            MemorySource::new()
                .with_source("tags/shared.txt", "Speed=DB1,REAL0\nRun=DB1,X4.0\n")
                .with_source("tags/other.txt", "Level=MW20\n"),
        );
        let store = DictionaryStore::new(source.clone(), "tags", scope);
        (source, store)
    }

    #[tokio::test]
    async fn test_same_source_loaded_once_and_shared() {
        let (source, store) = store_with(PassthroughScope::Controller);

        let a = store.load("shared.txt").await.unwrap();
        let b = store.load("shared.txt").await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.read_count(), 1);
        assert_eq!(store.parse_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_parse_once() {
        let (source, store) = store_with(PassthroughScope::Controller);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.load("shared.txt").await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(source.read_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_is_error_and_not_cached() {
        let (source, store) = store_with(PassthroughScope::Controller);

        let err = store.load("missing.txt").await.unwrap_err();
        assert!(matches!(err, GatewayError::TagSource { .. }));

        source.insert("tags/missing.txt", "Late=1");
        let dict = store.load("missing.txt").await.unwrap();
        assert_eq!(dict.get("Late"), Some("1"));
    }

    #[tokio::test]
    async fn test_controller_scope_overlays_are_private() {
        let (_, store) = store_with(PassthroughScope::Controller);
        let a = store.table_for("shared.txt").await.unwrap();
        let b = store.table_for("shared.txt").await.unwrap();

        assert!(Arc::ptr_eq(a.base(), b.base()));
        a.insert_passthrough("MW100");
        assert!(b.get("MW100").is_none());
    }

    #[tokio::test]
    async fn test_source_scope_overlays_are_shared() {
        let (_, store) = store_with(PassthroughScope::Source);
        let a = store.table_for("shared.txt").await.unwrap();
        let b = store.table_for("shared.txt").await.unwrap();
        let other = store.table_for("other.txt").await.unwrap();

        a.insert_passthrough("MW100");
        assert_eq!(b.get("MW100").as_deref(), Some("MW100"));
        assert!(other.get("MW100").is_none());
    }
}
