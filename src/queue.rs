use std::sync::Arc;

use serde_json::Value;
use vudata_core::{CollectionName, Family, QueueItem, StorageBackend, StorageError};

use crate::{error::PrimitiveError, payload, telemetry};

pub const DEFAULT_DEQUEUE_LIMIT: usize = 1;

/// Named FIFO queues.
///
/// A queue exists from its first enqueue until it is cleared, independent of
/// its depth. `dequeue`, `peek` and `depth` report `NotFound` only for a queue
/// that does not exist; an empty queue yields empty results.
pub struct QueueEngine {
    storage: Arc<dyn StorageBackend>,
}

impl QueueEngine {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Appends `items` in order as one batch, creating the queue if absent.
    /// Returns the positions assigned to the items.
    pub fn enqueue(&self, name: &CollectionName, items: &[Value]) -> Result<Vec<u64>, PrimitiveError> {
        if items.is_empty() {
            return Err(PrimitiveError::Validation(
                "enqueue requires at least one item".to_string(),
            ));
        }
        let encoded = items
            .iter()
            .map(payload::encode)
            .collect::<Result<Vec<_>, _>>()?;

        telemetry::observe(Family::Queue, "enqueue", || {
            let pushed = self.storage.push_items(name, &encoded)?;
            tracing::debug!(
                queue = %name,
                count = pushed.len(),
                first = pushed.first().map(|i| i.position),
                "items enqueued"
            );
            Ok(pushed.into_iter().map(|item| item.position).collect())
        })
    }

    /// Removes and returns up to `limit` items from the head of the queue.
    ///
    /// Payloads are decoded before the removal commits, so a corrupt item
    /// fails the whole call and leaves the queue as it was.
    pub fn dequeue(&self, name: &CollectionName, limit: usize) -> Result<Vec<Value>, PrimitiveError> {
        if limit == 0 {
            return Err(PrimitiveError::Validation(
                "dequeue limit must be at least 1".to_string(),
            ));
        }
        telemetry::observe(Family::Queue, "dequeue", || {
            let mut values = Vec::new();
            let mut decode = |item: &QueueItem| -> Result<(), StorageError> {
                values.push(payload::decode_stored(Family::Queue, name, &item.payload)?);
                Ok(())
            };
            self.storage
                .pop_items(name, limit, &mut decode)?
                .ok_or_else(|| PrimitiveError::not_found(Family::Queue, name))?;
            Ok(values)
        })
    }

    /// Returns the head item without removing it.
    pub fn peek(&self, name: &CollectionName) -> Result<Option<Value>, PrimitiveError> {
        telemetry::observe(Family::Queue, "peek", || {
            let head = self
                .storage
                .peek_item(name)?
                .ok_or_else(|| PrimitiveError::not_found(Family::Queue, name))?;
            head.map(|item| payload::decode(Family::Queue, name, &item.payload))
                .transpose()
        })
    }

    pub fn depth(&self, name: &CollectionName) -> Result<u64, PrimitiveError> {
        telemetry::observe(Family::Queue, "depth", || {
            self.storage
                .queue_depth(name)?
                .ok_or_else(|| PrimitiveError::not_found(Family::Queue, name))
        })
    }

    /// Drops the queue and all of its items. Clearing an absent queue succeeds.
    pub fn clear(&self, name: &CollectionName) -> Result<(), PrimitiveError> {
        telemetry::observe(Family::Queue, "clear", || Ok(self.storage.drop_queue(name)?))
    }
}
