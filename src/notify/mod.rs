//! Outbound notifications for newly persisted activities
//!
//! Persisting a record never waits on a notification. The ingestion handler
//! hands the record to an [`Outbox`], whose single dispatch task delivers it
//! through a [`Notifier`] with bounded retries.

mod outbox;

pub use outbox::{Outbox, RetryPolicy};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::record::ActivityRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification outbox is shut down")]
    Closed,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &ActivityRecord) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line per activity
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, record: &ActivityRecord) -> Result<(), NotifyError> {
        info!(
            record_id = %record.id,
            tenant_id = %record.tenant_id,
            actor_email = %record.actor.email,
            activity = %record.activity_name,
            "Activity notification"
        );
        Ok(())
    }
}
