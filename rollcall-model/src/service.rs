//! Generic typed service over one collection.

use crate::error::{ServiceError, ServiceResult};
use crate::record::DomainRecord;
use rollcall_sync::{
    ConflictCase, Patch, Record, RecordId, RemoteChange, Resolution, Subscription, SyncClient,
    SyncError, UpdateOptions, VersionedRecord,
};
use rollcall_types::{record_key, to_fields};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// A decoded push for a [`CollectionService`] subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedChange<T> {
    Upserted(VersionedRecord<T>),
    Removed(RecordId),
    /// The whole collection, in listing order.
    Snapshot(Vec<VersionedRecord<T>>),
}

/// Typed create/read/update/delete, listings and subscriptions for the
/// collection of `T`.
///
/// Reads go through the cache by default. Conflicts from the accessor are
/// returned unchanged; use [`resolve`](Self::resolve) to settle them.
pub struct CollectionService<T> {
    client: Arc<SyncClient>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionService<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _record: PhantomData,
        }
    }
}

impl<T: DomainRecord> CollectionService<T> {
    /// Binds the service to `client` and registers the collection's TTL.
    ///
    /// A TTL override in the client's configuration takes precedence over
    /// [`DomainRecord::DEFAULT_TTL`].
    pub fn new(client: Arc<SyncClient>) -> Self {
        client.cache().register_ttl(T::COLLECTION, T::DEFAULT_TTL);
        Self {
            client,
            _record: PhantomData,
        }
    }

    pub fn client(&self) -> &Arc<SyncClient> {
        &self.client
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Validates and creates a record. The result is at version 1.
    pub async fn create(&self, data: T) -> ServiceResult<VersionedRecord<T>> {
        self.check(&data)?;
        let record = self
            .client
            .accessor()
            .create(T::COLLECTION, to_fields(&data)?)
            .await?;
        decode(&record)
    }

    /// Writes back an edited record.
    ///
    /// `record.version` is taken as the version the caller observed; if the
    /// remote record has moved on the call fails with a conflict.
    pub async fn update(&self, record: &VersionedRecord<T>) -> ServiceResult<VersionedRecord<T>> {
        self.check(&record.data)?;
        let patch = Patch::from_data(record.version, &record.data)?;
        self.submit(&record.id, patch).await
    }

    /// Applies a partial change.
    ///
    /// The patched payload is validated against the last known state of
    /// the record before anything is written.
    pub async fn patch(&self, id: &RecordId, patch: Patch) -> ServiceResult<VersionedRecord<T>> {
        if let Some(mut candidate) = self.client.accessor().read(T::COLLECTION, id, true).await? {
            candidate.apply_fields(&patch.fields);
            self.check(&decode::<T>(&candidate)?.data)?;
        }
        self.submit(id, patch).await
    }

    /// Settles a conflict returned by [`update`](Self::update) or
    /// [`patch`](Self::patch).
    pub async fn resolve(
        &self,
        case: ConflictCase,
        resolution: Resolution,
    ) -> ServiceResult<VersionedRecord<T>> {
        let record = self.client.accessor().resolve(case, resolution).await?;
        decode(&record)
    }

    pub async fn delete(&self, id: &RecordId) -> ServiceResult<()> {
        self.client.accessor().delete(T::COLLECTION, id).await?;
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// One record, from the cache when fresh.
    pub async fn get(&self, id: &RecordId) -> ServiceResult<Option<VersionedRecord<T>>> {
        self.fetch(id, true).await
    }

    /// One record, bypassing the cache.
    pub async fn reload(&self, id: &RecordId) -> ServiceResult<Option<VersionedRecord<T>>> {
        self.fetch(id, false).await
    }

    /// The whole collection in [`DomainRecord::ordering_key`] order, from
    /// the cache when fresh.
    pub async fn list(&self) -> ServiceResult<Vec<VersionedRecord<T>>> {
        self.fetch_all(true).await
    }

    /// The whole collection, bypassing the cache.
    pub async fn reload_all(&self) -> ServiceResult<Vec<VersionedRecord<T>>> {
        self.fetch_all(false).await
    }

    /// Records of [`list`](Self::list) whose payload matches `predicate`.
    pub async fn filter<P>(&self, predicate: P) -> ServiceResult<Vec<VersionedRecord<T>>>
    where
        P: Fn(&T) -> bool,
    {
        let mut records = self.list().await?;
        records.retain(|r| predicate(&r.data));
        Ok(records)
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Subscribes to the whole collection. Pushes that do not decode as
    /// `T` are logged and skipped.
    pub fn subscribe<D, E>(&self, on_change: D, on_error: E) -> Subscription
    where
        D: Fn(TypedChange<T>) + Send + Sync + 'static,
        E: FnOnce(SyncError) + Send + 'static,
    {
        self.client.subscribe(
            T::COLLECTION,
            move |change| {
                if let Some(typed) = decode_change::<T>(change) {
                    on_change(typed);
                }
            },
            on_error,
        )
    }

    /// Subscribes to a single record.
    pub fn subscribe_record<D, E>(&self, id: &RecordId, on_change: D, on_error: E) -> Subscription
    where
        D: Fn(TypedChange<T>) + Send + Sync + 'static,
        E: FnOnce(SyncError) + Send + 'static,
    {
        self.client.subscribe(
            &record_key(T::COLLECTION, id),
            move |change| {
                if let Some(typed) = decode_change::<T>(change) {
                    on_change(typed);
                }
            },
            on_error,
        )
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn check(&self, data: &T) -> ServiceResult<()> {
        data.validate().map_err(|reason| {
            warn!("Rejected {} record: {reason}", T::COLLECTION);
            ServiceError::Invalid {
                collection: T::COLLECTION,
                reason,
            }
        })
    }

    async fn submit(&self, id: &RecordId, patch: Patch) -> ServiceResult<VersionedRecord<T>> {
        let record = self
            .client
            .accessor()
            .update(T::COLLECTION, id, patch, UpdateOptions::default())
            .await?;
        decode(&record)
    }

    async fn fetch(&self, id: &RecordId, use_cache: bool) -> ServiceResult<Option<VersionedRecord<T>>> {
        self.client
            .accessor()
            .read(T::COLLECTION, id, use_cache)
            .await?
            .as_ref()
            .map(decode::<T>)
            .transpose()
    }

    async fn fetch_all(&self, use_cache: bool) -> ServiceResult<Vec<VersionedRecord<T>>> {
        let records = self.client.accessor().list(T::COLLECTION, use_cache).await?;
        Ok(decode_listing(&records))
    }
}

fn decode<T: DomainRecord>(record: &Record) -> ServiceResult<VersionedRecord<T>> {
    Ok(record.decode::<T>()?)
}

fn decode_listing<T: DomainRecord>(records: &[Record]) -> Vec<VersionedRecord<T>> {
    let mut typed: Vec<VersionedRecord<T>> = records
        .iter()
        .filter_map(|record| match record.decode::<T>() {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!("Skipping {}/{}: {err}", T::COLLECTION, record.id);
                None
            }
        })
        .collect();
    typed.sort_by(|a, b| {
        a.data
            .ordering_key()
            .cmp(&b.data.ordering_key())
            .then_with(|| a.id.cmp(&b.id))
    });
    typed
}

fn decode_change<T: DomainRecord>(change: RemoteChange) -> Option<TypedChange<T>> {
    match change {
        RemoteChange::Upserted(record) => match record.decode::<T>() {
            Ok(decoded) => Some(TypedChange::Upserted(decoded)),
            Err(err) => {
                warn!("Dropping push for {}/{}: {err}", T::COLLECTION, record.id);
                None
            }
        },
        RemoteChange::Removed(id) => Some(TypedChange::Removed(id)),
        RemoteChange::Snapshot(records) => Some(TypedChange::Snapshot(decode_listing(&records))),
    }
}
