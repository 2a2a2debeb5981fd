use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stream entry: {0}")]
    Corrupt(String),

    #[error("Durable subscription '{0}' is already active")]
    DurableInUse(String),

    #[error("Stream is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
