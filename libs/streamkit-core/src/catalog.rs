//! Process-wide, reference-counted registry of stream sets by URI (SPEC_FULL.md §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::stream_set::StreamSet;

struct Entry {
    set: StreamSet,
    refcount: usize,
}

struct CatalogInner {
    sets: Mutex<HashMap<String, Entry>>,
    default_slot_count: usize,
}

/// A StreamSet exists in the catalog iff its refcount is >= 1. Cheap to
/// clone (`Arc` under the hood) so the Context and the PluginManager it
/// constructs can share one catalog.
#[derive(Clone)]
pub struct SetCatalog(Arc<CatalogInner>);

impl SetCatalog {
    pub fn new() -> Self {
        Self::with_default_slot_count(3)
    }

    pub fn with_default_slot_count(default_slot_count: usize) -> Self {
        Self(Arc::new(CatalogInner {
            sets: Mutex::new(HashMap::new()),
            default_slot_count,
        }))
    }

    /// Opens `uri`, incrementing its refcount if already open, otherwise
    /// creating and inserting a fresh StreamSet with refcount 1.
    pub fn open(&self, uri: &str, slot_count: usize) -> StreamSet {
        let mut sets = self.0.sets.lock();
        if let Some(entry) = sets.get_mut(uri) {
            entry.refcount += 1;
            return entry.set.clone();
        }
        let set = StreamSet::new(uri, slot_count);
        sets.insert(uri.to_string(), Entry { set: set.clone(), refcount: 1 });
        set
    }

    /// Opens using the catalog's default slot count (SPEC_FULL.md §6 `frame_bin_slot_count`).
    pub fn open_default(&self, uri: &str) -> StreamSet {
        self.open(uri, self.0.default_slot_count)
    }

    /// Decrements the refcount for `set`'s URI; destroys the entry at zero.
    /// A mismatch (set not found, or found but not the same handle) is a no-op.
    pub fn close(&self, set: &StreamSet) {
        let mut sets = self.0.sets.lock();
        let uri = set.uri().to_string();
        let Some(entry) = sets.get_mut(&uri) else { return };
        if !StreamSet::ptr_eq(&entry.set, set) {
            return;
        }
        entry.refcount -= 1;
        if entry.refcount == 0 {
            sets.remove(&uri);
        }
    }

    pub fn refcount(&self, uri: &str) -> usize {
        self.0.sets.lock().get(uri).map(|e| e.refcount).unwrap_or(0)
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.0.sets.lock().contains_key(uri)
    }
}

impl Default for SetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_same_uri_returns_same_handle_and_increments_refcount() {
        let catalog = SetCatalog::new();
        let a = catalog.open_default("device/0");
        let b = catalog.open_default("device/0");
        assert!(StreamSet::ptr_eq(&a, &b));
        assert_eq!(catalog.refcount("device/0"), 2);
    }

    #[test]
    fn closing_to_zero_destroys_set_and_reopen_yields_new_handle() {
        let catalog = SetCatalog::new();
        let a = catalog.open_default("device/0");
        let b = catalog.open_default("device/0");
        catalog.close(&a);
        assert!(catalog.is_open("device/0"));
        catalog.close(&b);
        assert!(!catalog.is_open("device/0"));

        let c = catalog.open_default("device/0");
        assert!(!StreamSet::ptr_eq(&a, &c));
    }

    #[test]
    fn close_on_unopened_uri_is_a_no_op() {
        let catalog = SetCatalog::new();
        let stray = StreamSet::new("device/1", 3);
        catalog.close(&stray);
        assert!(!catalog.is_open("device/1"));
    }
}
