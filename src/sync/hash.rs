//! Content hashing for change detection.
//!
//! Hashing the normalized syncable fields lets the engine tell whether a
//! local item changed since its last sync without trusting wall clocks.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::ItemFields;

/// Compute a SHA256 hash of a serializable value's JSON form.
///
/// Values that fail to serialize hash as their empty string form; none of
/// the crate's types can fail.
#[must_use]
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash of an item's syncable fields, insensitive to label order.
#[must_use]
pub fn fields_hash(fields: &ItemFields) -> String {
    let mut normalized = fields.normalized();
    if normalized.description.as_deref() == Some("") {
        normalized.description = None;
    }
    content_hash(&normalized)
}
