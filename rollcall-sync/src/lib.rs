//! Client-side synchronization core for rollcall.
//!
//! Sits between UI surfaces and a remote real-time database and lets many
//! independent surfaces read and write shared records without waiting on
//! the network, while staying consistent with a store that other clients
//! mutate concurrently.
//!
//! # Components
//!
//! - **Cache** ([`RecordCache`]): TTL entries per record and per collection
//!   listing, prefix invalidation, rollback snapshots.
//! - **Remote accessor** ([`RemoteAccessor`]): create/read/update/delete with
//!   optimistic cache writes that roll back on failure.
//! - **Conflict resolver** ([`ConflictCase`], [`Resolution`]): version
//!   mismatches are returned to the caller, never merged silently.
//! - **Listener manager** ([`ListenerManager`]): throttled change
//!   subscriptions that write through to the cache and reconnect with
//!   backoff.
//! - **Transport** ([`RemoteStore`]): the remote store seam, with an
//!   in-memory implementation in [`transport::mock`].
//!
//! # Consistency
//!
//! The remote store is the source of truth. Concurrency control is
//! optimistic: every update carries the version the caller last observed
//! and the store commits version + 1 only if it still matches.
//!
//! # Example
//!
//! ```
//! use rollcall_sync::{AllowAll, SyncClient, SyncConfig};
//! use rollcall_sync::transport::mock::InMemoryStore;
//! use std::sync::Arc;
//!
//! let client = SyncClient::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(AllowAll::default()),
//!     SyncConfig::default(),
//! );
//! assert!(client.cache().is_empty());
//! ```

mod accessor;
mod auth;
pub mod backoff;
mod client;
mod config;
mod conflict;
mod error;
pub mod listener;
mod record_cache;
pub mod retry;
pub mod transport;

pub use accessor::{RemoteAccessor, UpdateOptions};
pub use auth::{AllowAll, AuthProvider, OperationKind, ReadOnly};
pub use client::SyncClient;
pub use config::{ListenerConfig, SyncConfig};
pub use conflict::{ConflictCase, Resolution};
pub use error::{SyncError, SyncResult, TransportError, TransportResult};
pub use listener::{
    ListenerManager, SubscribeOptions, Subscription, SubscriptionId, SubscriptionInfo,
    SubscriptionState,
};
pub use record_cache::{CachedValue, RecordCache, RecordRollback};
pub use retry::{OperationArgs, OperationOutput, RetryableOperation};
pub use transport::{ChangeStream, RemoteChange, RemoteStore};

pub use rollcall_types::{Fields, Identity, Patch, Record, RecordId, Version, VersionedRecord};
