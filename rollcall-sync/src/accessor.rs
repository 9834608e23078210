//! Remote accessor: create/read/update/delete with optimistic caching.
//!
//! Writes go to the cache before the remote call and are rolled back if the
//! call fails or times out. Updates are version-checked by default: a patch
//! carries the version the caller last saw, and a mismatch with the remote
//! version produces a [`ConflictCase`] instead of a write.

use crate::auth::{AuthProvider, OperationKind};
use crate::config::SyncConfig;
use crate::conflict::ConflictCase;
use crate::error::{SyncError, SyncResult, TransportError, TransportResult};
use crate::record_cache::RecordCache;
use crate::transport::RemoteStore;
use chrono::Utc;
use rollcall_types::{Fields, Patch, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Options for [`RemoteAccessor::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Compare the patch's observed version with the remote version before
    /// writing. On by default.
    pub check_version: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            check_version: true,
        }
    }
}

impl UpdateOptions {
    /// Last-writer-wins: skip the version comparison.
    pub fn unchecked() -> Self {
        Self {
            check_version: false,
        }
    }
}

/// Performs remote operations and keeps the shared cache in step.
pub struct RemoteAccessor {
    store: Arc<dyn RemoteStore>,
    cache: Arc<RecordCache>,
    auth: Arc<dyn AuthProvider>,
    timeout: Duration,
}

impl RemoteAccessor {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<RecordCache>,
        auth: Arc<dyn AuthProvider>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            auth,
            timeout: config.request_timeout(),
        }
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// The auth collaborator.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    // ── Operations ───────────────────────────────────────────────

    /// Creates a record at version 1.
    ///
    /// The record is cached before the remote write. If the write fails the
    /// cache is restored and the caller must not assume the record exists.
    pub async fn create(&self, collection: &str, payload: Fields) -> SyncResult<Record> {
        self.authorize(OperationKind::Create, collection, None).await?;

        let id = self.store.allocate_id(collection);
        let mut record = Record::new(id.clone(), Fields::new(), self.auth.identity());
        record.apply_fields(&payload);

        let mut guard = self.cache.guard(collection, &id);
        guard.write(&record);
        debug!("Optimistically created {collection}/{id}");

        match self.call(self.store.create(collection, record)).await {
            Ok(confirmed) => {
                self.cache.put_record(collection, &confirmed);
                guard.commit();
                Ok(confirmed)
            }
            Err(err) => {
                guard.rollback();
                Err(self.write_error(err, collection, &id))
            }
        }
    }

    /// Reads one record. `Ok(None)` means it does not exist.
    ///
    /// With `use_cache`, a fresh cache entry is returned without contacting
    /// the remote store.
    pub async fn read(
        &self,
        collection: &str,
        id: &RecordId,
        use_cache: bool,
    ) -> SyncResult<Option<Record>> {
        self.authorize(OperationKind::Read, collection, Some(id)).await?;

        if use_cache {
            if let Some(record) = self.cache.record(collection, id) {
                debug!("Cache hit for {collection}/{id}");
                return Ok(Some(record));
            }
        }

        match self.call(self.store.read(collection, id)).await {
            Ok(Some(record)) => {
                self.cache.put_record(collection, &record);
                Ok(Some(record))
            }
            Ok(None) | Err(TransportError::NotFound) => {
                self.cache.forget_record(collection, id);
                Ok(None)
            }
            Err(err) => Err(self.read_error(err, collection)),
        }
    }

    /// Reads a whole collection.
    pub async fn list(&self, collection: &str, use_cache: bool) -> SyncResult<Vec<Record>> {
        self.authorize(OperationKind::List, collection, None).await?;

        if use_cache {
            if let Some(records) = self.cache.listing(collection) {
                debug!("Cache hit for {collection} listing");
                return Ok(records);
            }
        }

        match self.call(self.store.list(collection)).await {
            Ok(records) => {
                self.cache.put_listing(collection, &records);
                Ok(records)
            }
            Err(err) => Err(self.read_error(err, collection)),
        }
    }

    /// Applies `patch` to a record.
    ///
    /// With `check_version`, `patch.version` must equal the remote version,
    /// otherwise `SyncError::Conflict` is returned and nothing is written.
    /// The committed record has version remote + 1.
    pub async fn update(
        &self,
        collection: &str,
        id: &RecordId,
        patch: Patch,
        options: UpdateOptions,
    ) -> SyncResult<Record> {
        self.authorize(OperationKind::Update, collection, Some(id)).await?;

        let current = match self.call(self.store.read(collection, id)).await {
            Ok(Some(record)) => record,
            Ok(None) | Err(TransportError::NotFound) => {
                self.cache.forget_record(collection, id);
                return Err(SyncError::not_found(collection, id));
            }
            Err(err) => return Err(self.write_error(err, collection, id)),
        };

        if options.check_version && patch.version != current.version {
            debug!(
                "Conflict on {collection}/{id}: observed {}, remote {}",
                patch.version, current.version
            );
            self.cache.put_record(collection, &current);
            return Err(conflict(collection, patch, current));
        }

        let mut next = current.clone();
        next.apply_fields(&patch.fields);
        next.version = current.version.next().map_err(|err| {
            warn!("Cannot update {collection}/{id}: {err}");
            SyncError::Unknown(err.to_string())
        })?;
        next.last_modified = Utc::now();
        next.modified_by = self.auth.identity();

        let mut guard = self.cache.guard(collection, id);
        guard.write(&next);

        let expected = options.check_version.then_some(current.version);
        match self.call(self.store.update(collection, next, expected)).await {
            Ok(committed) => {
                self.cache.put_record(collection, &committed);
                guard.commit();
                debug!("Committed {collection}/{id} at {}", committed.version);
                Ok(committed)
            }
            Err(TransportError::VersionMismatch { current }) => {
                guard.rollback();
                self.cache.put_record(collection, &current);
                Err(conflict(collection, patch, *current))
            }
            Err(err) => {
                guard.rollback();
                Err(self.write_error(err, collection, id))
            }
        }
    }

    /// Removes a record remotely, then drops it from the cache.
    ///
    /// On failure the cache is left as it is.
    pub async fn delete(&self, collection: &str, id: &RecordId) -> SyncResult<()> {
        self.authorize(OperationKind::Delete, collection, Some(id)).await?;

        match self.call(self.store.delete(collection, id)).await {
            Ok(()) => {
                self.cache.forget_record(collection, id);
                Ok(())
            }
            Err(TransportError::NotFound) => {
                self.cache.forget_record(collection, id);
                Err(SyncError::not_found(collection, id))
            }
            Err(err) => Err(self.write_error(err, collection, id)),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn authorize(
        &self,
        op: OperationKind,
        collection: &str,
        id: Option<&RecordId>,
    ) -> SyncResult<()> {
        self.auth
            .authorize(op, collection, id)
            .await
            .map_err(|reason| {
                warn!("Auth denied {op} on {collection}: {reason}");
                SyncError::PermissionDenied(reason)
            })
    }

    async fn call<T>(&self, fut: impl Future<Output = TransportResult<T>>) -> TransportResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn write_error(&self, err: TransportError, collection: &str, id: &RecordId) -> SyncError {
        match err {
            TransportError::Unavailable(_) | TransportError::Timeout => {
                warn!("Write to {collection}/{id} failed: {err}");
                SyncError::RemoteWriteFailed(format!("{collection}/{id}: {err}"))
            }
            TransportError::PermissionDenied(reason) => SyncError::PermissionDenied(reason),
            TransportError::NotFound => SyncError::not_found(collection, id),
            other => {
                warn!("Unexpected failure writing {collection}/{id}: {other}");
                SyncError::Unknown(other.to_string())
            }
        }
    }

    fn read_error(&self, err: TransportError, collection: &str) -> SyncError {
        match err {
            TransportError::Unavailable(_) | TransportError::Timeout => {
                SyncError::RemoteReadFailed(format!("{collection}: {err}"))
            }
            TransportError::PermissionDenied(reason) => SyncError::PermissionDenied(reason),
            other => {
                warn!("Unexpected failure reading {collection}: {other}");
                SyncError::Unknown(other.to_string())
            }
        }
    }
}

fn conflict(collection: &str, patch: Patch, remote: Record) -> SyncError {
    SyncError::Conflict(Box::new(ConflictCase {
        collection: collection.to_string(),
        record_id: remote.id.clone(),
        local_expected_version: patch.version,
        remote_record: remote,
        local_attempted_changes: patch.fields,
    }))
}
