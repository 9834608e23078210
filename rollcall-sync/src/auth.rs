//! Identity/auth collaborator.
//!
//! The sync core does not authenticate anyone. It asks an [`AuthProvider`]
//! who is acting (for `modifiedBy`) and whether an operation may proceed.

use async_trait::async_trait;
use rollcall_types::{Identity, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of operation being authorized or retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Read,
    List,
    Update,
    Delete,
}

impl OperationKind {
    /// Whether the operation mutates the remote store.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::List => "list",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Supplies the acting identity and gates operations.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The identity stamped into `modifiedBy` on writes.
    fn identity(&self) -> Identity;

    /// Returns `Err(reason)` to deny the operation.
    async fn authorize(
        &self,
        op: OperationKind,
        collection: &str,
        id: Option<&RecordId>,
    ) -> Result<(), String> {
        let _ = (op, collection, id);
        Ok(())
    }
}

/// Permits everything, acting as a fixed identity.
#[derive(Debug, Clone, Default)]
pub struct AllowAll {
    identity: Identity,
}

impl AllowAll {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl AuthProvider for AllowAll {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }
}

/// Read-only access: every write is denied.
#[derive(Debug, Clone, Default)]
pub struct ReadOnly {
    identity: Identity,
}

impl ReadOnly {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl AuthProvider for ReadOnly {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    async fn authorize(
        &self,
        op: OperationKind,
        collection: &str,
        _id: Option<&RecordId>,
    ) -> Result<(), String> {
        if op.is_write() {
            return Err(format!("{} may not {op} in {collection}", self.identity));
        }
        Ok(())
    }
}
