use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A typed payload stored in one remote collection.
///
/// Implementors describe where their records live, how long cached copies
/// stay fresh and how listings are ordered. The envelope (`id`, `version`,
/// provenance) is not part of the payload.
pub trait DomainRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Remote collection name, also the cache key prefix.
    const COLLECTION: &'static str;

    /// Cache TTL used unless the configuration overrides it. Short for
    /// collections that change often, long for near-static ones.
    const DEFAULT_TTL: Duration;

    /// Sort key for listings.
    type Key: Ord;

    fn ordering_key(&self) -> Self::Key;

    /// Checks the payload before it is written.
    /// Return `Err(reason)` to reject the write.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
