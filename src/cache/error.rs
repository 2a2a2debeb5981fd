use thiserror::Error;

/// Ephemeral cache failures. Callers on the read path treat every variant as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
