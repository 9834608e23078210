//! Conflict resolution protocol.
//!
//! A conflict is not resolved here. [`RemoteAccessor::update`] packages it
//! as a [`ConflictCase`] and the caller picks a [`Resolution`]. Fields are
//! never merged automatically: domain fields are opaque to this layer.

use crate::accessor::{RemoteAccessor, UpdateOptions};
use crate::error::SyncResult;
use rollcall_types::{Fields, Patch, Record, RecordId, Version};
use std::fmt;
use tracing::info;

/// A rejected update and the remote state it collided with.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCase {
    pub collection: String,
    pub record_id: RecordId,
    /// The version the caller believed was current.
    pub local_expected_version: Version,
    /// The full remote record at the time of the check.
    pub remote_record: Record,
    /// The fields the caller tried to write.
    pub local_attempted_changes: Fields,
}

/// The caller's choice for a [`ConflictCase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Re-apply the local changes on top of the current remote record.
    KeepLocal,
    /// Discard the local changes and adopt the remote record.
    KeepRemote,
}

impl ConflictCase {
    pub fn remote_version(&self) -> Version {
        self.remote_record.version
    }

    /// Local changes rebased onto the remote version just observed.
    pub fn keep_local(&self) -> Patch {
        Patch {
            version: self.remote_record.version,
            fields: self.local_attempted_changes.clone(),
        }
    }

    /// The remote record, for the caller to refresh its view from.
    pub fn keep_remote(self) -> Record {
        self.remote_record
    }

    /// Attempted fields whose value differs from the remote record.
    pub fn differing_fields(&self) -> Vec<&str> {
        self.local_attempted_changes
            .iter()
            .filter(|(name, value)| {
                match self.remote_record.field(name) {
                    Some(remote) => remote != *value,
                    None => !value.is_null(),
                }
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Display for ConflictCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} expected {}, remote is {} (modified by {})",
            self.collection,
            self.record_id,
            self.local_expected_version,
            self.remote_record.version,
            self.remote_record.modified_by
        )
    }
}

impl RemoteAccessor {
    /// Carries out the caller's resolution of a conflict.
    ///
    /// `KeepLocal` issues a fresh version-checked update and may itself
    /// return another conflict if the record moved again. `KeepRemote`
    /// performs no remote call.
    pub async fn resolve(&self, case: ConflictCase, resolution: Resolution) -> SyncResult<Record> {
        info!("Resolving conflict on {case} with {resolution:?}");
        match resolution {
            Resolution::KeepLocal => {
                let patch = case.keep_local();
                self.update(&case.collection, &case.record_id, patch, UpdateOptions::default())
                    .await
            }
            Resolution::KeepRemote => {
                let collection = case.collection.clone();
                let remote = case.keep_remote();
                self.cache().put_record(&collection, &remote);
                Ok(remote)
            }
        }
    }
}
