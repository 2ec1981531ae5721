use std::sync::Arc;

use vudata_core::{CollectionName, Family, StorageBackend};

use crate::{error::PrimitiveError, telemetry};

/// Tracks which named collections exist in each family.
///
/// Existence is the presence of backing rows; there is no separate create
/// step. A caller that checks `exists` and then acts on the answer may race a
/// concurrent delete. The engines never rely on this check for their own
/// mutating paths.
pub struct Registry {
    storage: Arc<dyn StorageBackend>,
}

impl Registry {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn exists(&self, family: Family, name: &CollectionName) -> Result<bool, PrimitiveError> {
        telemetry::observe(family, "exists", || {
            Ok(self.storage.collection_exists(family, name)?)
        })
    }

    /// Names in ascending lexicographic order, including empty collections.
    pub fn list(&self, family: Family) -> Result<Vec<String>, PrimitiveError> {
        telemetry::observe(family, "list", || Ok(self.storage.list_collections(family)?))
    }
}
