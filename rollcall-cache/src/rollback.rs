//! Restore-on-failure guard for optimistic cache writes.

use crate::{Cache, CacheEntry};
use tracing::{debug, warn};

/// Prior state of a set of cache keys. `None` records absence.
#[derive(Debug, Clone)]
pub struct Snapshot<V> {
    entries: Vec<(String, Option<CacheEntry<V>>)>,
}

impl<V> Snapshot<V> {
    pub(crate) fn new(entries: Vec<(String, Option<CacheEntry<V>>)>) -> Self {
        Self { entries }
    }

    /// Keys covered by the snapshot.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// The captured entry for `key`, if the key is covered and was present.
    pub fn prior(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, e)| e.as_ref())
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Option<CacheEntry<V>>)> {
        self.entries
    }
}

/// Restores a snapshot when dropped unless [`commit`](Self::commit) was
/// called first.
///
/// Because restoration happens in `Drop`, it also runs when the owning
/// future is cancelled or unwinds. Keys marked with [`wrote`](Self::wrote)
/// are only restored while they still hold the marked value, so a newer
/// write by someone else survives the rollback.
pub struct CacheRollback<'a, V: Clone + PartialEq> {
    cache: &'a Cache<V>,
    snapshot: Option<Snapshot<V>>,
    written: Vec<(String, V)>,
}

impl<'a, V: Clone + PartialEq> CacheRollback<'a, V> {
    /// Captures `keys` before the caller mutates them.
    pub fn capture<I, K>(cache: &'a Cache<V>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            cache,
            snapshot: Some(cache.snapshot(keys)),
            written: Vec::new(),
        }
    }

    /// Marks `value` as what this writer stored under `key`.
    pub fn wrote(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        self.written.retain(|(k, _)| *k != key);
        self.written.push((key, value));
    }

    /// Keeps the optimistic state.
    pub fn commit(mut self) {
        self.snapshot = None;
    }

    /// Restores the captured state now.
    pub fn rollback(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let keys: Vec<&str> = snapshot.keys().collect();
            warn!("Rolling back optimistic cache state for {:?}", keys);
            let kept = self.cache.restore_unless_changed(snapshot, &self.written);
            if !kept.is_empty() {
                debug!("Kept newer cache entries for {:?}", kept);
            }
        }
    }
}

impl<V: Clone + PartialEq> Drop for CacheRollback<'_, V> {
    fn drop(&mut self) {
        self.restore();
    }
}
