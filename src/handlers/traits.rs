use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Job failure, classified by whether running the job again could succeed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// Infrastructure trouble; redelivery may succeed
    #[error("retryable failure: {0}")]
    Retryable(String),
    /// Malformed or invalid input; redelivery will fail the same way
    #[error("terminal failure: {0}")]
    Terminal(String),
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
}

impl JobError {
    pub fn retryable(reason: impl ToString) -> Self {
        Self::Retryable(reason.to_string())
    }

    pub fn terminal(reason: impl ToString) -> Self {
        Self::Terminal(reason.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Processes one raw payload taken off the worker queue
///
/// Implementations must be safe to run more than once for the same payload:
/// the event stream delivers at least once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), JobError>;
}
