use std::sync::Arc;

use tracing::debug;

use super::error::Result;
use super::stream::MessageStream;
use crate::record::{ActivityCreated, ActivityRecord};

/// Publishes `activity_log_created` events for the ingestion consumer
#[derive(Clone)]
pub struct ActivityPublisher {
    stream: Arc<dyn MessageStream>,
    subject: String,
}

impl ActivityPublisher {
    pub fn new(stream: Arc<dyn MessageStream>, subject: impl Into<String>) -> Self {
        Self {
            stream,
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wrap the record in an event envelope and publish it; returns the stream sequence
    pub async fn publish(&self, record: &ActivityRecord) -> Result<u64> {
        let event = ActivityCreated::new(record.clone());
        let payload = serde_json::to_vec(&event)?;
        let seq = self.stream.publish(&self.subject, payload).await?;

        debug!(
            seq,
            record_id = %record.id,
            event_id = %event.event_id,
            subject = %self.subject,
            "Activity event published"
        );
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{FjallStream, StreamSettings};
    use crate::record::{Actor, IncomingActivity, NewActivity};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_publishes_event_envelope() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FjallStream::open(dir.path(), StreamSettings::default()).unwrap());
        let publisher = ActivityPublisher::new(stream.clone(), "activity.log.created");

        let record = ActivityRecord::create(
            NewActivity::builder()
                .tenant_id("acme")
                .activity_name("user_created")
                .object_name("user")
                .object_id("u-1")
                .formatted_message("created")
                .actor(Actor::new("a1", "Admin", "admin@acme.test"))
                .build(),
        )
        .unwrap();
        publisher.publish(&record).await.unwrap();

        let mut sub = stream
            .subscribe("activity.log.created", "test")
            .await
            .unwrap();
        let delivery = sub.next().await.unwrap();
        let incoming = IncomingActivity::decode(&delivery.payload).unwrap();
        assert!(matches!(incoming, IncomingActivity::Event(_)));
        assert_eq!(incoming.into_record(), record);
        sub.unsubscribe().await;
    }
}
