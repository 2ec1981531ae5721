//! Core types and traits for vudata storage backends.
//!
//! This crate provides the `StorageBackend` trait and the data model shared by
//! every backend, enabling pluggable storage implementations in separate crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{CollectionName, Family, InvalidName, QueueItem};
pub use storage::{StorageBackend, StorageError};
