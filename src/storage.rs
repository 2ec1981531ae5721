use std::{sync::Arc, time::Duration};

use crate::config::{StorageConfig, StorageKind};

// Re-export core storage types so callers only depend on this crate
pub use vudata_core::storage::{StorageBackend, StorageError};
pub use vudata_memory::InMemoryStorage;
pub use vudata_sqlite::SqliteStorage;

/// Opens the backend named by the configuration.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let storage: Arc<dyn StorageBackend> = match config.backend {
        StorageKind::Memory => {
            tracing::warn!("using in-memory storage; data will not survive a restart");
            Arc::new(InMemoryStorage::new())
        }
        StorageKind::Sqlite => {
            tracing::info!(path = %config.path, "opening SQLite storage");
            Arc::new(SqliteStorage::with_busy_timeout(
                &config.path,
                Duration::from_millis(config.busy_timeout_ms),
            )?)
        }
    };
    Ok(storage)
}
