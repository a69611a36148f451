//! Tag dictionaries and per-controller tag tables.
//!
//! A [`TagDictionary`] is the parsed, immutable content of one tag source. It
//! is shared by `Arc` between every controller loaded from that source.
//!
//! A [`TagTable`] is what a controller actually resolves against: the shared
//! base dictionary plus an overlay holding passthrough entries synthesized at
//! resolution time. The overlay is consulted first. Whether the overlay is
//! private to the controller or shared by every controller of the same source
//! is decided by [`PassthroughScope`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Passthrough entries synthesized at resolution time: tag name -> address.
pub type Overlay = Arc<DashMap<String, String>>;

/// Parse one tag source line.
///
/// All whitespace is removed first. The line must then read `name=address`,
/// where the name starts with an ASCII letter, digit or `_`. The split happens
/// at the last `=`, so `A=B=C` maps `A=B` to `C`.
pub fn parse_line(line: &str) -> Option<(String, String)> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let (name, address) = compact.rsplit_once('=')?;

    let first = name.chars().next()?;
    if !(first.is_ascii_alphanumeric() || first == '_') || address.is_empty() {
        return None;
    }

    Some((name.to_string(), address.to_string()))
}

/// Immutable tag name -> address mapping parsed from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDictionary {
    entries: HashMap<String, String>,
}

impl TagDictionary {
    /// Parse source text. Lines that do not match are skipped silently.
    pub fn parse(text: &str) -> Self {
        let entries = text.lines().filter_map(parse_line).collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for TagDictionary {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Visibility of passthrough entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassthroughScope {
    /// Each controller keeps its own overlay.
    #[default]
    Controller,

    /// Controllers loaded from the same source share one overlay, so a
    /// passthrough entry added through one is visible through all of them.
    Source,
}

/// The dictionary view a controller resolves against.
#[derive(Debug)]
pub struct TagTable {
    source: PathBuf,
    base: Arc<TagDictionary>,
    overlay: Overlay,
    lookups: AtomicU64,
}

impl TagTable {
    pub fn new(source: impl Into<PathBuf>, base: Arc<TagDictionary>, overlay: Overlay) -> Self {
        Self {
            source: source.into(),
            base,
            overlay,
            lookups: AtomicU64::new(0),
        }
    }

    /// A table with a private, empty overlay.
    pub fn private(source: impl Into<PathBuf>, base: Arc<TagDictionary>) -> Self {
        Self::new(source, base, Overlay::default())
    }

    /// Source path this table was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The shared base dictionary.
    pub fn base(&self) -> &Arc<TagDictionary> {
        &self.base
    }

    /// Resolve a name: overlay first, then base.
    pub fn get(&self, name: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(address) = self.overlay.get(name) {
            return Some(address.value().clone());
        }
        self.base.get(name).map(str::to_string)
    }

    /// Record `name -> name` so the symbolic name is used as a literal address.
    ///
    /// Returns the address that is now bound, which is the existing one if
    /// another caller got there first.
    pub fn insert_passthrough(&self, name: &str) -> String {
        self.overlay
            .entry(name.to_string())
            .or_insert_with(|| name.to_string())
            .value()
            .clone()
    }

    /// Number of `get` calls served (diagnostics).
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of passthrough entries.
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    /// Merged, sorted view of base and overlay.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut all: BTreeMap<String, String> = self
            .base
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for entry in self.overlay.iter() {
            all.insert(entry.key().clone(), entry.value().clone());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_strips_whitespace() {
        assert_eq!(
            parse_line("  Motor Speed = DB1, REAL4 \r"),
            Some(("MotorSpeed".into(), "DB1,REAL4".into()))
        );
    }

    #[test]
    fn test_parse_line_rejects() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line("=DB1"), None);
        assert_eq!(parse_line("Name="), None);
        assert_eq!(parse_line("no separator"), None);
        assert_eq!(parse_line("-x=1"), None);
    }

    #[test]
    fn test_parse_line_splits_at_last_equals() {
        assert_eq!(parse_line("A=B=C"), Some(("A=B".into(), "C".into())));
        assert_eq!(parse_line("_t=1"), Some(("_t".into(), "1".into())));
    }

    #[test]
    fn test_dictionary_parse() {
        let dict = TagDictionary::parse("Speed=DB1,REAL0\n// header\nRun=DB1,X4.0\n\nbad line\n");
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("Speed"), Some("DB1,REAL0"));
        assert!(dict.contains("Run"));
        assert!(!dict.contains("bad"));
    }

    #[test]
    fn test_table_overlay_first() {
        let base: Arc<TagDictionary> = Arc::new(
            [("A".to_string(), "DB1".to_string())].into_iter().collect(),
        );
        let table = TagTable::private("a.txt", base);

        assert_eq!(table.get("A").as_deref(), Some("DB1"));
        assert_eq!(table.get("MW10"), None);
        assert_eq!(table.insert_passthrough("MW10"), "MW10");
        assert_eq!(table.get("MW10").as_deref(), Some("MW10"));
        assert_eq!(table.lookup_count(), 3);
        assert_eq!(table.overlay_len(), 1);

        let snap = table.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["MW10"], "MW10");
    }

    #[test]
    fn test_shared_overlay_visible_across_tables() {
        let base = Arc::new(TagDictionary::default());
        let overlay = Overlay::default();
        let a = TagTable::new("same.txt", Arc::clone(&base), Arc::clone(&overlay));
        let b = TagTable::new("same.txt", base, overlay);

        a.insert_passthrough("X");
        assert_eq!(b.get("X").as_deref(), Some("X"));
    }
}
