use crate::models::{CollectionName, Family, QueueItem};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("store is busy: could not obtain exclusive transaction")]
    Busy,
    #[error("stored {family} {name} is corrupt: {reason}")]
    Corrupt {
        family: Family,
        name: String,
        reason: String,
    },
    #[error("counter overflow: {0}")]
    Overflow(String),
}

/// The transactional store shared by every primitive engine.
///
/// Each mutating method runs as one exclusive transaction: it either commits
/// in full or leaves no trace. Read methods may use non-exclusive reads.
/// Implementations never retry on contention; they return `StorageError::Busy`.
pub trait StorageBackend: Send + Sync {
    // Collection registry
    fn collection_exists(&self, family: Family, name: &CollectionName) -> Result<bool, StorageError>;
    fn list_collections(&self, family: Family) -> Result<Vec<String>, StorageError>;

    // Counters
    fn set_counter(&self, name: &CollectionName, value: i64) -> Result<(), StorageError>;
    fn increment_counter(&self, name: &CollectionName) -> Result<i64, StorageError>;
    fn delete_counter(&self, name: &CollectionName) -> Result<(), StorageError>;

    // Map entries, payloads are JSON text
    fn put_entry(&self, name: &CollectionName, payload: &str) -> Result<(), StorageError>;
    fn get_entry(&self, name: &CollectionName) -> Result<Option<String>, StorageError>;
    fn delete_entry(&self, name: &CollectionName) -> Result<(), StorageError>;

    // Queues
    /// Appends `payloads` in order, creating the queue if absent.
    fn push_items(&self, name: &CollectionName, payloads: &[String]) -> Result<Vec<QueueItem>, StorageError>;
    /// Removes and returns up to `limit` lowest-position items in one transaction.
    /// `None` means the queue does not exist.
    ///
    /// `check` sees each selected item in position order before the removal
    /// commits; if it fails, nothing is removed and its error is returned.
    fn pop_items(
        &self,
        name: &CollectionName,
        limit: usize,
        check: &mut dyn FnMut(&QueueItem) -> Result<(), StorageError>,
    ) -> Result<Option<Vec<QueueItem>>, StorageError>;
    fn peek_item(&self, name: &CollectionName) -> Result<Option<Option<QueueItem>>, StorageError>;
    fn queue_depth(&self, name: &CollectionName) -> Result<Option<u64>, StorageError>;
    fn drop_queue(&self, name: &CollectionName) -> Result<(), StorageError>;
}
