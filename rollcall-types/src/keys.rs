//! Cache key scheme.
//!
//! A record lives under `"<collection>/<id>"`; a cached full listing of a
//! collection lives under the bare collection name. Invalidating the
//! collection name as a prefix therefore drops both.

use crate::RecordId;

/// Key of a single record.
#[must_use]
pub fn record_key(collection: &str, id: &RecordId) -> String {
    format!("{collection}/{id}")
}

/// Key of a collection's full listing.
#[must_use]
pub fn collection_key(collection: &str) -> String {
    collection.to_string()
}

/// Splits a record key back into collection and id.
#[must_use]
pub fn split_record_key(key: &str) -> Option<(&str, RecordId)> {
    let (collection, id) = key.rsplit_once('/')?;
    if collection.is_empty() || id.is_empty() {
        return None;
    }
    Some((collection, RecordId::from(id)))
}
