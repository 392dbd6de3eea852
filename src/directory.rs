//! Name-indexed resource directories.
//!
//! One directory exists per resource kind (signatures, the four PSO kinds,
//! render passes). Directories are built while the archive is constructed
//! and are read-only afterwards, except for the cache slot of each entry,
//! which memoizes the constructed device object. Kinds are independent
//! namespaces: the same name may appear in two different directories.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ArchiveError, Result};

#[derive(Debug)]
struct DirEntry<T> {
    offset: u32,
    size: u32,
    cached: Option<T>,
}

/// `name -> (offset, size, cached object)` map for one resource kind.
///
/// The lock is only ever contended by cache installs; lookups after
/// construction take the read path.
#[derive(Debug)]
pub struct NamedResourceMap<T> {
    entries: RwLock<HashMap<String, DirEntry<T>>>,
}

impl<T> Default for NamedResourceMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NamedResourceMap<T> {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a named entry. Names are case-sensitive and must be unique
    /// within this directory.
    pub fn insert(&self, name: &str, offset: u32, size: u32) -> Result<()> {
        let mut entries = self.entries.write().expect("directory lock poisoned");
        match entries.entry(name.to_owned()) {
            MapEntry::Occupied(_) => Err(ArchiveError::DuplicateName(name.to_owned())),
            MapEntry::Vacant(slot) => {
                slot.insert(DirEntry {
                    offset,
                    size,
                    cached: None,
                });
                Ok(())
            }
        }
    }

    /// Byte range of the entry's common block, or `None` when the name is
    /// absent (the caller surfaces `NotFound` with its kind attached).
    pub fn get_offset_and_size(&self, name: &str) -> Option<(u32, u32)> {
        let entries = self.entries.read().expect("directory lock poisoned");
        entries.get(name).map(|e| (e.offset, e.size))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("directory lock poisoned").len()
    }

    /// True when the directory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> NamedResourceMap<T> {
    /// Returns the memoized constructed object, if any.
    pub fn get_cached(&self, name: &str) -> Option<T> {
        let entries = self.entries.read().expect("directory lock poisoned");
        entries.get(name).and_then(|e| e.cached.clone())
    }

    /// Installs a constructed object. Racing installs are benign: the last
    /// writer wins and the loser's object becomes garbage.
    pub fn set_cached(&self, name: &str, object: T) {
        let mut entries = self.entries.write().expect("directory lock poisoned");
        if let Some(entry) = entries.get_mut(name) {
            entry.cached = Some(object);
        }
    }

    /// Drops every memoized object; offsets and sizes are untouched.
    pub fn clear_cache(&self) {
        let mut entries = self.entries.write().expect("directory lock poisoned");
        for entry in entries.values_mut() {
            entry.cached = None;
        }
    }
}
