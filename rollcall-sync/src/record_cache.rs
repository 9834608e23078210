//! Record-aware view over the generic cache.
//!
//! Holds single records under `"collection/id"` and full collection
//! listings under `"collection"`, and keeps a cached listing coherent when
//! an individual record is written or removed. Shared by the accessor and
//! the listener manager.

use crate::config::SyncConfig;
use rollcall_cache::{Cache, CacheEntry, CacheRollback};
use rollcall_types::{Record, RecordId, collection_key, record_key};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// What the cache stores.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Record(Record),
    Collection(Vec<Record>),
}

/// The sync core's single shared cache.
#[derive(Debug)]
pub struct RecordCache {
    inner: Cache<CachedValue>,
    default_ttl: Duration,
    ttls: RwLock<HashMap<String, Duration>>,
}

impl RecordCache {
    /// Creates an empty cache using the TTLs from `config`.
    pub fn new(config: &SyncConfig) -> Self {
        let ttls = config
            .collection_ttls_ms
            .iter()
            .map(|(c, ms)| (c.clone(), Duration::from_millis(*ms)))
            .collect();
        Self {
            inner: Cache::new(),
            default_ttl: config.default_ttl(),
            ttls: RwLock::new(ttls),
        }
    }

    // ── TTLs ─────────────────────────────────────────────────────

    /// TTL applied to entries of `collection`.
    pub fn ttl_for(&self, collection: &str) -> Duration {
        self.ttls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Sets a collection's TTL unless one is already configured.
    pub fn register_ttl(&self, collection: &str, ttl: Duration) {
        self.ttls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_insert(ttl);
    }

    // ── Reads ────────────────────────────────────────────────────

    /// A fresh cached record.
    pub fn record(&self, collection: &str, id: &RecordId) -> Option<Record> {
        match self.inner.get(&record_key(collection, id))? {
            CachedValue::Record(r) => Some(r),
            CachedValue::Collection(_) => None,
        }
    }

    /// A fresh cached listing of a whole collection.
    pub fn listing(&self, collection: &str) -> Option<Vec<Record>> {
        match self.inner.get(&collection_key(collection))? {
            CachedValue::Collection(records) => Some(records),
            CachedValue::Record(_) => None,
        }
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Caches a record and folds it into a cached listing, if any.
    pub fn put_record(&self, collection: &str, record: &Record) {
        self.inner.set(
            record_key(collection, &record.id),
            CachedValue::Record(record.clone()),
            self.ttl_for(collection),
        );
        self.inner.update(&collection_key(collection), |value| {
            if let CachedValue::Collection(records) = value {
                match records.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => *existing = record.clone(),
                    None => records.push(record.clone()),
                }
            }
        });
    }

    /// Replaces everything cached for `collection` with `records`.
    pub fn put_listing(&self, collection: &str, records: &[Record]) {
        let ttl = self.ttl_for(collection);
        self.inner.invalidate(collection);
        for record in records {
            self.inner.set(
                record_key(collection, &record.id),
                CachedValue::Record(record.clone()),
                ttl,
            );
        }
        self.inner.set(
            collection_key(collection),
            CachedValue::Collection(records.to_vec()),
            ttl,
        );
    }

    /// Drops a record and removes it from a cached listing, if any.
    pub fn forget_record(&self, collection: &str, id: &RecordId) {
        self.inner.remove(&record_key(collection, id));
        self.inner.update(&collection_key(collection), |value| {
            if let CachedValue::Collection(records) = value {
                records.retain(|r| &r.id != id);
            }
        });
    }

    /// Starts an optimistic write of one record.
    ///
    /// See [`RecordRollback`] for what a failed write puts back.
    pub fn guard(&self, collection: &str, id: &RecordId) -> RecordRollback<'_> {
        let listed = self.inner.peek(&collection_key(collection)).and_then(|entry| match entry.value {
            CachedValue::Collection(records) => records.into_iter().find(|r| &r.id == id),
            CachedValue::Record(_) => None,
        });
        RecordRollback {
            cache: self,
            collection: collection.to_string(),
            entry: Some(CacheRollback::capture(&self.inner, [record_key(collection, id)])),
            listed,
            written: None,
        }
    }

    // ── Introspection ────────────────────────────────────────────

    /// Raw entry, stale or not. Intended for tests.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<CachedValue>> {
        self.inner.peek(key)
    }

    /// Removes a key or an entire collection.
    pub fn invalidate(&self, key_or_prefix: &str) -> usize {
        self.inner.invalidate(key_or_prefix)
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Undo handle for one optimistic record write.
///
/// A failed write reverts only what it stored itself. The record key goes
/// back to its prior entry while it still holds the optimistic value, and
/// the record's element in a cached listing is put back (or dropped) while
/// it still matches. Pushes that landed in the meantime are kept.
///
/// Reverts on drop unless [`commit`](Self::commit) was called.
pub struct RecordRollback<'a> {
    cache: &'a RecordCache,
    collection: String,
    entry: Option<CacheRollback<'a, CachedValue>>,
    listed: Option<Record>,
    written: Option<Record>,
}

impl RecordRollback<'_> {
    /// Caches `record` optimistically.
    pub fn write(&mut self, record: &Record) {
        self.cache.put_record(&self.collection, record);
        if let Some(entry) = self.entry.as_mut() {
            entry.wrote(
                record_key(&self.collection, &record.id),
                CachedValue::Record(record.clone()),
            );
        }
        self.written = Some(record.clone());
    }

    /// Keeps the optimistic state.
    pub fn commit(mut self) {
        if let Some(entry) = self.entry.take() {
            entry.commit();
        }
        self.written = None;
    }

    /// Reverts now.
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for RecordRollback<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.rollback();
        }
        let Some(written) = self.written.take() else {
            return;
        };
        let listed = self.listed.take();
        let mut reverted = false;
        self.cache
            .inner
            .update(&collection_key(&self.collection), |value| {
                let CachedValue::Collection(records) = value else {
                    return;
                };
                let Some(pos) = records.iter().position(|r| r.id == written.id) else {
                    return;
                };
                if records[pos] != written {
                    return;
                }
                match listed {
                    Some(prior) => records[pos] = prior,
                    None => {
                        records.remove(pos);
                    }
                }
                reverted = true;
            });
        if reverted {
            debug!("Reverted {}/{} in cached listing", self.collection, written.id);
        }
    }
}
