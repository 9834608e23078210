//! Core type definitions for the rollcall sync core.
//!
//! This crate defines the collection-agnostic types shared by the cache,
//! the remote accessor and the domain services:
//! - Record identifiers, versions and acting identities
//! - [`VersionedRecord`], the envelope every stored record travels in
//! - [`Patch`], the field changes a caller submits together with the
//!   version it last observed
//! - Cache key helpers (`"collection/id"` and `"collection"`)
//!
//! Domain fields are opaque at this level: the core only ever looks at
//! `id` and `version`. Typed payloads are converted to and from the
//! untyped [`Record`] with [`VersionedRecord::encode`] and
//! [`VersionedRecord::decode`].

mod ids;
mod keys;
mod record;

pub use ids::{Identity, RecordId, Version};
pub use keys::{collection_key, record_key, split_record_key};
pub use record::{Fields, Patch, RESERVED_FIELDS, Record, VersionedRecord, to_fields};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur converting records.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record payload must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("invalid version: {0}")]
    InvalidVersion(u64),

    #[error("version {0} has no successor")]
    VersionExhausted(u64),
}
