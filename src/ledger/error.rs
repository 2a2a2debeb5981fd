use thiserror::Error;

use crate::record::RecordId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Activity record not found: {0}")]
    NotFound(RecordId),

    #[error("Activity record already exists: {0}")]
    Conflict(RecordId),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Fjall(_) | StoreError::Unavailable(_) | StoreError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
