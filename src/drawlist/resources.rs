//! Resource store: persistent strings and blobs defined by drawlists.
//!
//! Resources are keyed by nonzero u32 IDs in two independent namespaces.
//! DEF commands insert or replace, FREE removes; total byte accounting and
//! entry counts are bounded by the engine limits.
//!
//! Execution goes through a [`StoreTxn`] overlay: defines and frees land in
//! the overlay first and are committed only after the whole drawlist has
//! executed, which keeps failed submissions free of side effects.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Resource namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResKind {
    /// UTF-8-ish text payloads for DRAW_TEXT and link references.
    String,
    /// Opaque byte payloads: text-run segments, RGBA canvases, images.
    Blob,
}

/// Owned resource bytes keyed by (kind, id).
#[derive(Debug, Default)]
pub struct ResourceStore {
    entries: HashMap<(ResKind, u32), Box<[u8]>>,
    total_bytes: usize,
}

impl ResourceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of resource `id`, or FORMAT when undefined.
    pub fn get(&self, kind: ResKind, id: u32) -> Result<&[u8]> {
        self.entries
            .get(&(kind, id))
            .map(AsRef::as_ref)
            .ok_or(Error::Format("undefined resource id"))
    }

    /// True when the id is defined.
    pub fn contains(&self, kind: ResKind, id: u32) -> bool {
        self.entries.contains_key(&(kind, id))
    }

    /// Define or replace a resource, updating byte accounting.
    pub fn define(&mut self, kind: ResKind, id: u32, bytes: &[u8]) {
        debug_assert_ne!(id, 0);
        if let Some(old) = self.entries.insert((kind, id), bytes.into()) {
            self.total_bytes -= old.len();
        }
        self.total_bytes += bytes.len();
    }

    /// Remove a resource; FORMAT when it was never defined.
    pub fn free(&mut self, kind: ResKind, id: u32) -> Result<()> {
        match self.entries.remove(&(kind, id)) {
            Some(old) => {
                self.total_bytes -= old.len();
                Ok(())
            }
            None => Err(Error::Format("free of undefined resource id")),
        }
    }

    /// Number of entries of `kind`.
    pub fn count(&self, kind: ResKind) -> usize {
        self.entries.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Total owned payload bytes across both namespaces.
    pub const fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// True when nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pending mutation for one (kind, id).
#[derive(Debug, Clone)]
enum Pending {
    Defined(Vec<u8>),
    Freed,
}

/// A transactional overlay over the store.
///
/// Lookups see pending defines and frees; nothing reaches the store until
/// [`StoreTxn::commit`]. The overlay does not itself borrow the store, so
/// the same transaction can be staged against a `&ResourceStore` and later
/// committed against a `&mut ResourceStore`; callers pass `store` to every
/// read so the overlay and the underlying store can be borrowed
/// independently.
#[derive(Debug, Default)]
pub struct StoreTxn {
    pending: HashMap<(ResKind, u32), Pending>,
}

impl StoreTxn {
    /// Begin an empty transaction.
    pub fn new(_store: &ResourceStore) -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Resolve resource bytes through the overlay.
    pub fn get<'s>(&'s self, store: &'s ResourceStore, kind: ResKind, id: u32) -> Result<&'s [u8]> {
        match self.pending.get(&(kind, id)) {
            Some(Pending::Defined(bytes)) => Ok(bytes),
            Some(Pending::Freed) => Err(Error::Format("undefined resource id")),
            None => store.get(kind, id),
        }
    }

    /// True when the id resolves through the overlay.
    pub fn contains(&self, store: &ResourceStore, kind: ResKind, id: u32) -> bool {
        match self.pending.get(&(kind, id)) {
            Some(Pending::Defined(_)) => true,
            Some(Pending::Freed) => false,
            None => store.contains(kind, id),
        }
    }

    /// Stage a define (insert or replace).
    pub fn define(&mut self, kind: ResKind, id: u32, bytes: &[u8]) {
        self.pending.insert((kind, id), Pending::Defined(bytes.to_vec()));
    }

    /// Stage a free; FORMAT when the id does not currently resolve.
    pub fn free(&mut self, store: &ResourceStore, kind: ResKind, id: u32) -> Result<()> {
        if !self.contains(store, kind, id) {
            return Err(Error::Format("free of undefined resource id"));
        }
        self.pending.insert((kind, id), Pending::Freed);
        Ok(())
    }

    /// Entry count of `kind` as it would stand after commit.
    pub fn count(&self, store: &ResourceStore, kind: ResKind) -> usize {
        let mut count = store.count(kind);
        for ((k, id), p) in &self.pending {
            if *k != kind {
                continue;
            }
            let existed = store.contains(kind, *id);
            match p {
                Pending::Defined(_) if !existed => count += 1,
                Pending::Freed if existed => count -= 1,
                _ => {}
            }
        }
        count
    }

    /// Apply all staged mutations to the store. Infallible: every staged
    /// operation was already checked against the pre-commit state.
    pub fn commit(self, store: &mut ResourceStore) {
        for ((kind, id), p) in self.pending {
            match p {
                Pending::Defined(bytes) => store.define(kind, id, &bytes),
                Pending::Freed => {
                    // Frees were verified resolvable at stage time; a miss
                    // here can only mean the entry was overlay-local.
                    let _ = store.free(kind, id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_lookup_free() {
        let mut store = ResourceStore::new();
        store.define(ResKind::String, 7, b"hello");
        assert_eq!(store.get(ResKind::String, 7).unwrap(), b"hello");
        assert_eq!(store.total_bytes(), 5);
        store.free(ResKind::String, 7).unwrap();
        assert!(matches!(
            store.get(ResKind::String, 7),
            Err(Error::Format(_))
        ));
        assert_eq!(store.total_bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_redefine_updates_accounting() {
        let mut store = ResourceStore::new();
        store.define(ResKind::Blob, 1, b"aaaa");
        store.define(ResKind::Blob, 1, b"bb");
        assert_eq!(store.get(ResKind::Blob, 1).unwrap(), b"bb");
        assert_eq!(store.total_bytes(), 2);
        assert_eq!(store.count(ResKind::Blob), 1);
    }

    #[test]
    fn test_namespaces_independent() {
        let mut store = ResourceStore::new();
        store.define(ResKind::String, 1, b"s");
        store.define(ResKind::Blob, 1, b"b");
        assert_eq!(store.get(ResKind::String, 1).unwrap(), b"s");
        assert_eq!(store.get(ResKind::Blob, 1).unwrap(), b"b");
    }

    #[test]
    fn test_free_undefined_fails() {
        let mut store = ResourceStore::new();
        assert!(store.free(ResKind::String, 3).is_err());
    }

    #[test]
    fn test_txn_isolation_until_commit() {
        let mut store = ResourceStore::new();
        store.define(ResKind::String, 1, b"old");
        {
            let mut txn = StoreTxn::new(&store);
            txn.define(ResKind::String, 1, b"new");
            txn.define(ResKind::String, 2, b"extra");
            assert_eq!(txn.get(&store, ResKind::String, 1).unwrap(), b"new");
            // Dropped without commit.
        }
        assert_eq!(store.get(ResKind::String, 1).unwrap(), b"old");
        assert!(!store.contains(ResKind::String, 2));
    }

    #[test]
    fn test_txn_commit_applies() {
        let mut store = ResourceStore::new();
        store.define(ResKind::String, 1, b"old");
        let mut txn = StoreTxn::new(&store);
        txn.define(ResKind::String, 2, b"two");
        txn.free(&store, ResKind::String, 1).unwrap();
        txn.commit(&mut store);
        assert!(!store.contains(ResKind::String, 1));
        assert_eq!(store.get(ResKind::String, 2).unwrap(), b"two");
    }

    #[test]
    fn test_txn_define_then_free_then_draw_fails() {
        let store = ResourceStore::new();
        let mut txn = StoreTxn::new(&store);
        txn.define(ResKind::String, 5, b"gone");
        txn.free(&store, ResKind::String, 5).unwrap();
        assert!(txn.get(&store, ResKind::String, 5).is_err());
    }

    #[test]
    fn test_txn_count_projection() {
        let mut store = ResourceStore::new();
        store.define(ResKind::String, 1, b"a");
        store.define(ResKind::String, 2, b"b");
        let mut txn = StoreTxn::new(&store);
        txn.define(ResKind::String, 3, b"c");
        txn.free(&store, ResKind::String, 1).unwrap();
        assert_eq!(txn.count(&store, ResKind::String), 2);
    }
}
