use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the librarian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Capacity of the parsed-primitive lookup cache. Only lookups are
    /// evicted on overflow; raw bytes and indices are never dropped.
    pub memory_cache: usize,
    /// When set, raw bytes are persisted as one file per reference ghid in
    /// this directory, which must already exist.
    pub cache_dir: Option<PathBuf>,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            memory_cache: 10_000,
            cache_dir: None,
        }
    }
}
