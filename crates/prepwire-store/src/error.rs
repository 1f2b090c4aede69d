use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing row, or a row owned by a different user. The two cases
    /// are deliberately indistinguishable to callers.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

impl From<StoreError> for prepwire_core::PrepwireError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => prepwire_core::PrepwireError::NotFound(what),
            StoreError::Database(e) => prepwire_core::PrepwireError::Database(e.to_string()),
            StoreError::Serialization(e) => prepwire_core::PrepwireError::Serialization(e),
            StoreError::Corrupt(what) => prepwire_core::PrepwireError::Internal(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
