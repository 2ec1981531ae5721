use std::sync::Arc;

use serde_json::Value;
use vudata_core::{CollectionName, Family, StorageBackend};

use crate::{error::PrimitiveError, payload, telemetry};

/// Named JSON values. Each operation touches one row, so no transaction
/// beyond the store's single-statement atomicity is needed.
pub struct MapStore {
    storage: Arc<dyn StorageBackend>,
}

impl MapStore {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn put(&self, name: &CollectionName, value: &Value) -> Result<(), PrimitiveError> {
        let encoded = payload::encode(value)?;
        telemetry::observe(Family::Map, "put", || Ok(self.storage.put_entry(name, &encoded)?))
    }

    pub fn get(&self, name: &CollectionName) -> Result<Value, PrimitiveError> {
        telemetry::observe(Family::Map, "get", || {
            let raw = self
                .storage
                .get_entry(name)?
                .ok_or_else(|| PrimitiveError::not_found(Family::Map, name))?;
            payload::decode(Family::Map, name, &raw)
        })
    }

    pub fn remove(&self, name: &CollectionName) -> Result<(), PrimitiveError> {
        telemetry::observe(Family::Map, "remove", || Ok(self.storage.delete_entry(name)?))
    }
}
