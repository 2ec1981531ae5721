use std::sync::Arc;

use vudata_core::{CollectionName, Family, StorageBackend};

use crate::{error::PrimitiveError, telemetry};

pub struct CounterEngine {
    storage: Arc<dyn StorageBackend>,
}

impl CounterEngine {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Sets the counter to exactly `start_value`, creating it if needed.
    pub fn initialize(&self, name: &CollectionName, start_value: i64) -> Result<(), PrimitiveError> {
        if start_value < 1 {
            return Err(PrimitiveError::Validation(format!(
                "counter start value must be at least 1, got {}",
                start_value
            )));
        }
        telemetry::observe(Family::Counter, "initialize", || {
            self.storage.set_counter(name, start_value)?;
            tracing::debug!(counter = %name, start_value, "counter initialized");
            Ok(())
        })
    }

    /// Atomically advances the counter and returns the new value.
    ///
    /// An absent counter reads as 0, so the first call returns 1. Concurrent
    /// callers each observe a distinct value.
    pub fn increment_and_get(&self, name: &CollectionName) -> Result<i64, PrimitiveError> {
        telemetry::observe(Family::Counter, "increment", || {
            Ok(self.storage.increment_counter(name)?)
        })
    }

    pub fn remove(&self, name: &CollectionName) -> Result<(), PrimitiveError> {
        telemetry::observe(Family::Counter, "remove", || {
            Ok(self.storage.delete_counter(name)?)
        })
    }
}
