use thiserror::Error;
use vudata_core::{Family, InvalidName, StorageError};

#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{family} not found: {name}")]
    NotFound { family: Family, name: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PrimitiveError {
    pub fn not_found(family: Family, name: impl ToString) -> Self {
        PrimitiveError::NotFound {
            family,
            name: name.to_string(),
        }
    }

    /// Transient failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PrimitiveError::Storage(StorageError::Busy))
    }
}

impl From<InvalidName> for PrimitiveError {
    fn from(e: InvalidName) -> Self {
        PrimitiveError::Validation(e.to_string())
    }
}
