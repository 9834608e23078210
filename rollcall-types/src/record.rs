//! The versioned record envelope and caller patches.

use crate::{Error, Identity, RecordId, Result, Version};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Untyped domain fields of a record.
pub type Fields = serde_json::Map<String, Value>;

/// A record whose domain fields have not been decoded.
///
/// This is the shape the cache, the transport and the accessor work with.
pub type Record = VersionedRecord<Fields>;

/// Envelope field names. Domain payloads may not use them.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "version", "lastModified", "modifiedBy"];

/// A record stored in the remote store, with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord<T = Fields> {
    pub id: RecordId,
    pub version: Version,
    pub last_modified: DateTime<Utc>,
    pub modified_by: Identity,
    #[serde(flatten)]
    pub data: T,
}

impl<T> VersionedRecord<T> {
    /// Creates a first-version record stamped with the current time.
    pub fn new(id: RecordId, data: T, modified_by: Identity) -> Self {
        Self {
            id,
            version: Version::INITIAL,
            last_modified: Utc::now(),
            modified_by,
            data,
        }
    }

    /// Replaces the payload, keeping the envelope.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> VersionedRecord<U> {
        VersionedRecord {
            id: self.id,
            version: self.version,
            last_modified: self.last_modified,
            modified_by: self.modified_by,
            data: f(self.data),
        }
    }
}

impl<T: Serialize> VersionedRecord<T> {
    /// Converts a typed record into an untyped [`Record`].
    pub fn encode(&self) -> Result<Record> {
        Ok(VersionedRecord {
            id: self.id.clone(),
            version: self.version,
            last_modified: self.last_modified,
            modified_by: self.modified_by.clone(),
            data: to_fields(&self.data)?,
        })
    }
}

impl Record {
    /// Decodes the domain fields into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<VersionedRecord<T>> {
        let data = serde_json::from_value(Value::Object(self.data.clone()))?;
        Ok(VersionedRecord {
            id: self.id.clone(),
            version: self.version,
            last_modified: self.last_modified,
            modified_by: self.modified_by.clone(),
            data,
        })
    }

    /// Returns a single domain field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Shallow-merges `changes` onto the domain fields.
    ///
    /// A `null` value removes the field. Envelope names are ignored.
    pub fn apply_fields(&mut self, changes: &Fields) {
        for (name, value) in changes {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            if value.is_null() {
                self.data.remove(name);
            } else {
                self.data.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Serializes a payload into domain fields, dropping envelope names.
pub fn to_fields<T: Serialize>(data: &T) -> Result<Fields> {
    match serde_json::to_value(data)? {
        Value::Object(mut map) => {
            for name in RESERVED_FIELDS {
                map.remove(name);
            }
            Ok(map)
        }
        other => Err(Error::NotAnObject(other.to_string())),
    }
}

/// Field changes submitted for an update.
///
/// `version` is the version the caller last observed; the accessor compares
/// it against the remote version before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub version: Version,
    pub fields: Fields,
}

impl Patch {
    /// An empty patch against `observed`.
    pub fn new(observed: Version) -> Self {
        Self {
            version: observed,
            fields: Fields::new(),
        }
    }

    /// Builds a patch that overwrites every field of `data`.
    pub fn from_data<T: Serialize>(observed: Version, data: &T) -> Result<Self> {
        Ok(Self {
            version: observed,
            fields: to_fields(data)?,
        })
    }

    /// Sets one field.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Marks one field for removal.
    #[must_use]
    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::Null);
        self
    }

    /// Rebases the patch onto another observed version.
    #[must_use]
    pub fn rebased(mut self, observed: Version) -> Self {
        self.version = observed;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
