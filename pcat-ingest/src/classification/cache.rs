//! Classification cache
//!
//! JSON object keyed by `brand|name` (or `name`), read fully at startup and
//! rewritten fully on every insert. A failed write is logged and otherwise
//! ignored; the in-memory copy stays authoritative for the process.

use crate::error::CacheError;
use crate::types::ClassificationResult;
use pcat_common::config::write_atomically;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ClassificationCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, ClassificationResult>,
}

impl ClassificationCache {
    /// Cache with no backing file
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a cache file; a missing file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), entries = entries.len(), "Loaded classification cache");
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// Load, or start empty (keeping the path) when the file is unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Classification cache unreadable, starting empty"
                );
                Self {
                    path: Some(path),
                    entries: BTreeMap::new(),
                }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&ClassificationResult> {
        self.entries.get(key)
    }

    /// Store a result and rewrite the backing file
    pub fn insert(&mut self, key: impl Into<String>, result: ClassificationResult) {
        let key = key.into();
        debug!(key = %key, category = %result.category, "Caching classification");
        self.entries.insert(key, result);
        if let Err(e) = self.persist() {
            warn!(error = %e, "Classification cache write failed");
        }
    }

    /// Rewrite the backing file from memory
    pub fn persist(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_string_pretty(&self.entries)?;
        write_atomically(path, body.as_bytes())?;
        Ok(())
    }

    /// Drop every entry and rewrite the backing file
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        let removed = self.entries.len();
        self.entries.clear();
        self.persist()?;
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
