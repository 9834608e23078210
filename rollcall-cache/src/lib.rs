//! In-process key/value cache for the rollcall sync core.
//!
//! Entries carry their own expiry instant. Expiry is lazy: a stale entry is
//! evicted by the read that finds it. Keys follow the `"collection/id"`
//! scheme, so [`Cache::invalidate`] with a collection name drops the whole
//! collection.
//!
//! Every operation takes the same mutex, which makes a read-and-evict atomic
//! with respect to concurrent writes. Time comes from [`tokio::time::Instant`]
//! so expiry can be driven by a paused test clock.
//!
//! Optimistic writers use [`CacheRollback`] to capture the entries they are
//! about to overwrite and restore them if the remote write fails.

mod rollback;

pub use rollback::{CacheRollback, Snapshot};

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Longest lifetime an entry can be given.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cached value and the instant it goes stale.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is still fresh at `now`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe TTL cache keyed by string.
#[derive(Debug)]
pub struct Cache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Cache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-applied entry, so a
    // poisoned map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value if present and unexpired; evicts it if stale.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_fresh_at(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!("Evicted stale cache entry {key}");
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites an entry that expires after `ttl`.
    ///
    /// TTLs beyond what the clock can represent are capped at [`MAX_TTL`].
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.lock().insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Mutates a fresh entry in place, keeping its expiry.
    ///
    /// Returns `false` (and leaves the cache untouched) when the key is
    /// absent or stale.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut V)) -> bool {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.is_fresh_at(now) => {
                f(&mut entry.value);
                true
            }
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Removes `key` and every entry nested under it (`"key/..."`).
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, key_or_prefix: &str) -> usize {
        let exact = key_or_prefix.trim_end_matches('/');
        let nested = format!("{exact}/");
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| k != exact && !k.starts_with(&nested));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {removed} cache entries under {exact}");
        }
        removed
    }

    /// Removes exactly one key, leaving nested keys alone.
    pub fn remove(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().remove(key)
    }

    /// Removes everything.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        debug!("Cleared cache ({count} entries)");
    }

    /// Returns the raw entry without checking or evicting on expiry.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().get(key).cloned()
    }

    /// Drops every stale entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh_at(now));
        before - entries.len()
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Captures the current raw state of `keys`.
    pub fn snapshot<I, K>(&self, keys: I) -> Snapshot<V>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let entries = self.lock();
        let saved = keys
            .into_iter()
            .map(|k| {
                let k = k.into();
                let prior = entries.get(&k).cloned();
                (k, prior)
            })
            .collect();
        Snapshot::new(saved)
    }

    /// Puts every captured key back exactly as it was.
    pub fn restore(&self, snapshot: Snapshot<V>) {
        let mut entries = self.lock();
        for (key, prior) in snapshot.into_entries() {
            put_back(&mut entries, key, prior);
        }
    }
}

impl<V: Clone + PartialEq> Cache<V> {
    /// Like [`restore`](Self::restore), but a key listed in `written` is
    /// only put back while it still holds the value written there.
    ///
    /// Returns the keys left alone because someone else replaced them.
    pub fn restore_unless_changed(&self, snapshot: Snapshot<V>, written: &[(String, V)]) -> Vec<String> {
        let mut entries = self.lock();
        let mut kept = Vec::new();
        for (key, prior) in snapshot.into_entries() {
            let ours = written.iter().find(|(k, _)| *k == key).map(|(_, v)| v);
            match ours {
                Some(value) if entries.get(&key).map(|e| &e.value) != Some(value) => {
                    kept.push(key);
                }
                _ => put_back(&mut entries, key, prior),
            }
        }
        kept
    }
}

fn put_back<V>(entries: &mut HashMap<String, CacheEntry<V>>, key: String, prior: Option<CacheEntry<V>>) {
    match prior {
        Some(entry) => {
            entries.insert(key, entry);
        }
        None => {
            entries.remove(&key);
        }
    }
}
