//! Tag dictionary store.
//!
//! Tag sources are text files of `name=address` lines. This module parses
//! them, caches the result per source path, and builds the per-controller
//! [`TagTable`]s the resolver works against.
//!
//! - [`TagSource`]: where source text comes from
//! - [`FileSource`]: tag files on disk (default)
//! - [`MemorySource`]: in-memory sources for tests and demos
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tagw::store::{DictionaryStore, FileSource, PassthroughScope};
//!
//! let store = DictionaryStore::new(Arc::new(FileSource::new()), "tags", PassthroughScope::Controller);
//! let table = store.table_for("plc1.txt").await?;
//! ```

mod cache;
mod dictionary;
mod file;
mod memory;
mod traits;

pub use cache::DictionaryStore;
pub use dictionary::{parse_line, Overlay, PassthroughScope, TagDictionary, TagTable};
pub use file::FileSource;
pub use memory::MemorySource;
pub use traits::TagSource;
