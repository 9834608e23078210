//! In-memory remote store for tests and demos.
//!
//! Behaves like a real-time database with per-collection maps and change
//! streams, plus fault injection: failing writes/reads/attaches, stream
//! errors, permission denial and artificial latency.

use super::{ChangeStream, RemoteChange, RemoteStore};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use rollcall_types::{Record, RecordId, Version, record_key};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Number of calls the store has served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub creates: usize,
    pub reads: usize,
    pub lists: usize,
    pub updates: usize,
    pub deletes: usize,
    pub watches: usize,
}

impl CallCounts {
    /// Calls that fetched data (`read` + `list`).
    pub fn fetches(&self) -> usize {
        self.reads + self.lists
    }

    /// Calls that mutated data.
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Default)]
struct Faults {
    write_failures: VecDeque<TransportError>,
    read_failures: u32,
    watch_failures: u32,
    denied: Option<String>,
    latency: Option<Duration>,
}

struct Watcher {
    path: String,
    tx: UnboundedSender<TransportResult<RemoteChange>>,
}

/// An in-memory [`RemoteStore`].
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<RecordId, Record>>>,
    watchers: Mutex<Vec<Watcher>>,
    faults: Mutex<Faults>,
    calls: Mutex<CallCounts>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding & inspection ─────────────────────────────────────

    /// Stores a record as-is (no version bump) and notifies watchers.
    pub fn insert(&self, collection: &str, record: Record) {
        let id = record.id.clone();
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), record.clone());
        self.notify(collection, &id, RemoteChange::Upserted(record));
    }

    /// Returns the stored record, bypassing faults and counters.
    pub fn get(&self, collection: &str, id: &RecordId) -> Option<Record> {
        lock(&self.collections)
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        lock(&self.collections)
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Calls served so far.
    pub fn calls(&self) -> CallCounts {
        *lock(&self.calls)
    }

    pub fn reset_calls(&self) {
        *lock(&self.calls) = CallCounts::default();
    }

    /// Live change streams attached to `path`.
    pub fn watcher_count(&self, path: &str) -> usize {
        lock(&self.watchers)
            .iter()
            .filter(|w| w.path == path && !w.tx.is_closed())
            .count()
    }

    // ── Fault injection ──────────────────────────────────────────

    /// The next `n` writes fail with `Unavailable`.
    pub fn fail_next_writes(&self, n: u32) {
        let mut faults = lock(&self.faults);
        for _ in 0..n {
            faults
                .write_failures
                .push_back(TransportError::Unavailable("injected write failure".into()));
        }
    }

    /// The next write fails with `error`.
    pub fn fail_next_write_with(&self, error: TransportError) {
        lock(&self.faults).write_failures.push_back(error);
    }

    /// The next `n` reads or lists fail with `Unavailable`.
    pub fn fail_next_reads(&self, n: u32) {
        lock(&self.faults).read_failures += n;
    }

    /// The next `n` watch attaches fail with `Unavailable`.
    pub fn fail_next_watches(&self, n: u32) {
        lock(&self.faults).watch_failures += n;
    }

    /// Every call fails with `PermissionDenied` until [`allow`](Self::allow).
    pub fn deny(&self, reason: impl Into<String>) {
        lock(&self.faults).denied = Some(reason.into());
    }

    pub fn allow(&self) {
        lock(&self.faults).denied = None;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.faults).latency = latency;
    }

    /// Delivers a transport error on every stream attached to `path`.
    pub fn push_error(&self, path: &str, error: TransportError) {
        for w in lock(&self.watchers).iter().filter(|w| w.path == path) {
            let _ = w.tx.unbounded_send(Err(error.clone()));
        }
    }

    /// Ends every stream attached to `path` without an error.
    pub fn close_streams(&self, path: &str) {
        lock(&self.watchers).retain(|w| w.path != path);
    }

    // ── Internals ────────────────────────────────────────────────

    async fn enter(&self, count: impl FnOnce(&mut CallCounts)) -> TransportResult<()> {
        count(&mut lock(&self.calls));
        let (latency, denied) = {
            let faults = lock(&self.faults);
            (faults.latency, faults.denied.clone())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match denied {
            Some(reason) => Err(TransportError::PermissionDenied(reason)),
            None => Ok(()),
        }
    }

    fn take_write_failure(&self) -> TransportResult<()> {
        match lock(&self.faults).write_failures.pop_front() {
            Some(err) => {
                debug!("Injecting write failure: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn take_read_failure(&self) -> TransportResult<()> {
        let mut faults = lock(&self.faults);
        if faults.read_failures > 0 {
            faults.read_failures -= 1;
            return Err(TransportError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    fn notify(&self, collection: &str, id: &RecordId, change: RemoteChange) {
        let record_path = record_key(collection, id);
        lock(&self.watchers).retain(|w| {
            if w.path == collection || w.path == record_path {
                w.tx.unbounded_send(Ok(change.clone())).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }

    fn current_value(&self, path: &str) -> Option<RemoteChange> {
        let collections = lock(&self.collections);
        match path.split_once('/') {
            Some((collection, id)) => collections
                .get(collection)
                .and_then(|c| c.get(&RecordId::from(id)))
                .cloned()
                .map(RemoteChange::Upserted),
            None => {
                let records = collections
                    .get(path)
                    .map(|c| c.values().cloned().collect())
                    .unwrap_or_default();
                Some(RemoteChange::Snapshot(records))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn create(&self, collection: &str, record: Record) -> TransportResult<Record> {
        self.enter(|c| c.creates += 1).await?;
        self.take_write_failure()?;
        {
            let mut collections = lock(&self.collections);
            let records = collections.entry(collection.to_string()).or_default();
            if records.contains_key(&record.id) {
                return Err(TransportError::Other(format!(
                    "{} already exists",
                    record_key(collection, &record.id)
                )));
            }
            records.insert(record.id.clone(), record.clone());
        }
        self.notify(collection, &record.id, RemoteChange::Upserted(record.clone()));
        Ok(record)
    }

    async fn read(&self, collection: &str, id: &RecordId) -> TransportResult<Option<Record>> {
        self.enter(|c| c.reads += 1).await?;
        self.take_read_failure()?;
        Ok(self.get(collection, id))
    }

    async fn list(&self, collection: &str) -> TransportResult<Vec<Record>> {
        self.enter(|c| c.lists += 1).await?;
        self.take_read_failure()?;
        Ok(lock(&self.collections)
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: &str,
        mut record: Record,
        expected: Option<Version>,
    ) -> TransportResult<Record> {
        self.enter(|c| c.updates += 1).await?;
        self.take_write_failure()?;
        {
            let mut collections = lock(&self.collections);
            let current = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(&record.id))
                .ok_or(TransportError::NotFound)?;
            if let Some(expected) = expected {
                if expected != current.version {
                    return Err(TransportError::VersionMismatch {
                        current: Box::new(current.clone()),
                    });
                }
            }
            record.version = current
                .version
                .next()
                .map_err(|err| TransportError::Other(err.to_string()))?;
            *current = record.clone();
        }
        self.notify(collection, &record.id, RemoteChange::Upserted(record.clone()));
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> TransportResult<()> {
        self.enter(|c| c.deletes += 1).await?;
        self.take_write_failure()?;
        let removed = lock(&self.collections)
            .get_mut(collection)
            .and_then(|c| c.remove(id));
        if removed.is_none() {
            return Err(TransportError::NotFound);
        }
        self.notify(collection, id, RemoteChange::Removed(id.clone()));
        Ok(())
    }

    async fn watch(&self, path: &str) -> TransportResult<ChangeStream> {
        self.enter(|c| c.watches += 1).await?;
        {
            let mut faults = lock(&self.faults);
            if faults.watch_failures > 0 {
                faults.watch_failures -= 1;
                return Err(TransportError::Unavailable("injected attach failure".into()));
            }
        }
        let (tx, rx) = unbounded();
        if let Some(initial) = self.current_value(path) {
            let _ = tx.unbounded_send(Ok(initial));
        }
        lock(&self.watchers).push(Watcher {
            path: path.to_string(),
            tx,
        });
        debug!("Attached watcher to {path}");
        Ok(rx.boxed())
    }
}
