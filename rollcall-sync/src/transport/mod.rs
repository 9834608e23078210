//! Remote store abstraction.
//!
//! The sync core treats the real-time database as a black box behind
//! [`RemoteStore`]. Implementations must return full records from `read`
//! and `update` so conflicts can carry the remote value without a second
//! round trip.

pub mod mock;

use crate::error::TransportResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use rollcall_types::{Record, RecordId, Version};

/// A change pushed by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// A record was created or modified.
    Upserted(Record),
    /// A record was removed.
    Removed(RecordId),
    /// The full current contents of a watched collection.
    Snapshot(Vec<Record>),
}

/// Stream of pushes for one watched path. Dropping it detaches.
pub type ChangeStream = BoxStream<'static, TransportResult<RemoteChange>>;

/// Create/read/update/delete and change streams against the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Generates the key for a new record in `collection`.
    ///
    /// Keys are allocated client-side so an optimistic create can be cached
    /// before the write is issued.
    fn allocate_id(&self, collection: &str) -> RecordId {
        let _ = collection;
        RecordId::generate()
    }

    /// Writes a new record. Fails if the id is already taken.
    async fn create(&self, collection: &str, record: Record) -> TransportResult<Record>;

    /// Reads one record; `None` if absent.
    async fn read(&self, collection: &str, id: &RecordId) -> TransportResult<Option<Record>>;

    /// Reads every record of a collection.
    async fn list(&self, collection: &str) -> TransportResult<Vec<Record>>;

    /// Replaces a record and returns what was committed.
    ///
    /// The store assigns the committed version (current + 1). When
    /// `expected` is set and differs from the current version, nothing is
    /// written and `TransportError::VersionMismatch` carries the current
    /// record.
    async fn update(
        &self,
        collection: &str,
        record: Record,
        expected: Option<Version>,
    ) -> TransportResult<Record>;

    /// Removes a record. Fails with `NotFound` if absent.
    async fn delete(&self, collection: &str, id: &RecordId) -> TransportResult<()>;

    /// Attaches to the change stream for a collection (`"classes"`) or a
    /// single record (`"classes/c1"`).
    async fn watch(&self, path: &str) -> TransportResult<ChangeStream>;
}
