//! JSON payload encoding.
//!
//! Payloads are serialized once on write, so the store only ever holds
//! well-formed JSON text. A stored value that still fails to parse was written
//! out-of-band and is reported as corrupt.

use serde_json::Value;
use vudata_core::{CollectionName, Family, StorageError};

use crate::error::PrimitiveError;

pub fn encode(value: &Value) -> Result<String, PrimitiveError> {
    serde_json::to_string(value)
        .map_err(|e| PrimitiveError::Validation(format!("unserializable payload: {}", e)))
}

pub fn decode(family: Family, name: &CollectionName, raw: &str) -> Result<Value, PrimitiveError> {
    Ok(decode_stored(family, name, raw)?)
}

/// Like `decode`, for use inside a storage transaction.
pub fn decode_stored(family: Family, name: &CollectionName, raw: &str) -> Result<Value, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
        family,
        name: name.to_string(),
        reason: e.to_string(),
    })
}
