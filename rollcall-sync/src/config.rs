//! Configuration for the sync core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for any single remote call (ms). A write that times out
    /// is rolled back and reported as `RemoteWriteFailed`.
    pub request_timeout_ms: u64,
    /// TTL for cached records of collections without an override (ms).
    pub default_ttl_ms: u64,
    /// Per-collection TTL overrides (ms).
    pub collection_ttls_ms: HashMap<String, u64>,
    /// Defaults for listener subscriptions.
    pub listener: ListenerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            default_ttl_ms: 60_000,
            collection_ttls_ms: HashMap::new(),
            listener: ListenerConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON configuration document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets a TTL override for one collection.
    #[must_use]
    pub fn with_collection_ttl(mut self, collection: impl Into<String>, ttl: Duration) -> Self {
        self.collection_ttls_ms
            .insert(collection.into(), u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// TTL configured for `collection`, or the default.
    pub fn ttl_for(&self, collection: &str) -> Duration {
        self.collection_ttls_ms
            .get(collection)
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or_else(|| self.default_ttl())
    }
}

/// Listener defaults: throttling and reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Minimum time between delivered callbacks (ms). Zero disables throttling.
    pub throttle_ms: u64,
    /// Reattach attempts after a transport error before giving up.
    pub max_retries: u32,
    /// First reattach delay (ms); doubles on each attempt.
    pub retry_delay_ms: u64,
    /// Cap for the reattach delay (ms).
    pub max_retry_delay_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 250,
            max_retries: 5,
            retry_delay_ms: 500,
            max_retry_delay_ms: 30_000,
        }
    }
}
