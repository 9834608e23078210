//! Retryable operations.
//!
//! A [`RetryableOperation`] is a plain value naming the collection, the
//! operation and its arguments. Whoever holds it (a "retry" button, a test,
//! a background job) re-runs it the same way. The core does not retry
//! one-shot operations on its own.

use crate::accessor::{RemoteAccessor, UpdateOptions};
use crate::auth::OperationKind;
use crate::error::SyncResult;
use rollcall_types::{Fields, Patch, Record, RecordId};
use serde::{Deserialize, Serialize};

/// Arguments of a one-shot operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationArgs {
    Create { payload: Fields },
    Read { id: RecordId, use_cache: bool },
    List { use_cache: bool },
    Update { id: RecordId, patch: Patch, options: UpdateOptions },
    Delete { id: RecordId },
}

/// What a re-run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Created(Record),
    Read(Option<Record>),
    Listed(Vec<Record>),
    Updated(Record),
    Deleted,
}

/// An operation that can be invoked again verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryableOperation {
    pub collection: String,
    pub args: OperationArgs,
}

impl RetryableOperation {
    pub fn create(collection: impl Into<String>, payload: Fields) -> Self {
        Self {
            collection: collection.into(),
            args: OperationArgs::Create { payload },
        }
    }

    pub fn read(collection: impl Into<String>, id: RecordId, use_cache: bool) -> Self {
        Self {
            collection: collection.into(),
            args: OperationArgs::Read { id, use_cache },
        }
    }

    pub fn list(collection: impl Into<String>, use_cache: bool) -> Self {
        Self {
            collection: collection.into(),
            args: OperationArgs::List { use_cache },
        }
    }

    pub fn update(
        collection: impl Into<String>,
        id: RecordId,
        patch: Patch,
        options: UpdateOptions,
    ) -> Self {
        Self {
            collection: collection.into(),
            args: OperationArgs::Update { id, patch, options },
        }
    }

    pub fn delete(collection: impl Into<String>, id: RecordId) -> Self {
        Self {
            collection: collection.into(),
            args: OperationArgs::Delete { id },
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self.args {
            OperationArgs::Create { .. } => OperationKind::Create,
            OperationArgs::Read { .. } => OperationKind::Read,
            OperationArgs::List { .. } => OperationKind::List,
            OperationArgs::Update { .. } => OperationKind::Update,
            OperationArgs::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Runs the operation against `accessor`.
    pub async fn run(&self, accessor: &RemoteAccessor) -> SyncResult<OperationOutput> {
        let collection = self.collection.as_str();
        match &self.args {
            OperationArgs::Create { payload } => accessor
                .create(collection, payload.clone())
                .await
                .map(OperationOutput::Created),
            OperationArgs::Read { id, use_cache } => accessor
                .read(collection, id, *use_cache)
                .await
                .map(OperationOutput::Read),
            OperationArgs::List { use_cache } => accessor
                .list(collection, *use_cache)
                .await
                .map(OperationOutput::Listed),
            OperationArgs::Update { id, patch, options } => accessor
                .update(collection, id, patch.clone(), *options)
                .await
                .map(OperationOutput::Updated),
            OperationArgs::Delete { id } => accessor
                .delete(collection, id)
                .await
                .map(|()| OperationOutput::Deleted),
        }
    }
}
