use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::traits::{JobError, JobHandler};
use crate::ledger::{RecordStore, StoreError};
use crate::notify::Outbox;
use crate::record::IncomingActivity;

/// Ingestion handler: decode an activity payload, validate it and write it
/// through the record store.
///
/// Malformed payloads and invalid records are terminal. A redelivered event
/// whose record is already stored unchanged counts as success.
#[derive(Clone)]
pub struct PersistActivityHandler {
    store: Arc<dyn RecordStore>,
    outbox: Option<Arc<Outbox>>,
}

impl PersistActivityHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            outbox: None,
        }
    }

    pub fn with_outbox(mut self, outbox: Arc<Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }
}

fn store_failure(error: StoreError) -> JobError {
    if error.is_transient() {
        JobError::retryable(error)
    } else {
        JobError::terminal(error)
    }
}

#[async_trait]
impl JobHandler for PersistActivityHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), JobError> {
        let record = IncomingActivity::decode(payload)
            .map_err(|e| JobError::terminal(format!("malformed activity payload: {e}")))?
            .into_record();

        record.validate().map_err(JobError::terminal)?;

        match self.store.create(&record).await {
            Ok(()) => {
                info!(record_id = %record.id, tenant_id = %record.tenant_id, "Activity persisted");
            }
            Err(StoreError::Conflict(id)) => {
                let existing = self.store.get_by_id(&id).await.map_err(store_failure)?;
                if existing == record {
                    debug!(record_id = %id, "Activity already persisted, treating redelivery as done");
                    return Ok(());
                }
                return Err(JobError::terminal(format!(
                    "record {id} already exists with different content"
                )));
            }
            Err(e) => return Err(store_failure(e)),
        }

        if let Some(outbox) = &self.outbox {
            if let Err(e) = outbox.enqueue(record) {
                warn!(error = %e, "Activity notification not queued");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FjallRecordStore;
    use crate::record::{ActivityCreated, ActivityRecord, Actor, NewActivity};
    use tempfile::TempDir;

    fn record() -> ActivityRecord {
        ActivityRecord::create(
            NewActivity::builder()
                .tenant_id("acme")
                .activity_name("user_created")
                .object_name("user")
                .object_id("u-1")
                .formatted_message("Admin created user u-1")
                .actor(Actor::new("a1", "Admin", "admin@acme.test"))
                .build(),
        )
        .unwrap()
    }

    fn setup() -> (TempDir, Arc<FjallRecordStore>, PersistActivityHandler) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallRecordStore::open(temp_dir.path()).unwrap());
        let handler = PersistActivityHandler::new(store.clone());
        (temp_dir, store, handler)
    }

    #[tokio::test]
    async fn test_persists_event_envelope() {
        let (_dir, store, handler) = setup();
        let record = record();
        let payload = serde_json::to_vec(&ActivityCreated::new(record.clone())).unwrap();

        handler.handle(&payload).await.unwrap();

        assert_eq!(store.get_by_id(&record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_persists_bare_record() {
        let (_dir, store, handler) = setup();
        let record = record();
        let payload = serde_json::to_vec(&record).unwrap();

        handler.handle(&payload).await.unwrap();

        assert_eq!(store.count_by_tenant("acme").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_terminal() {
        let (_dir, _store, handler) = setup();

        let error = handler.handle(b"{not json").await.unwrap_err();
        assert!(error.is_terminal());
    }

    #[tokio::test]
    async fn test_invalid_record_is_terminal() {
        let (_dir, store, handler) = setup();
        let mut record = record();
        record.actor.email = "not-an-email".to_string();
        let payload = serde_json::to_vec(&record).unwrap();

        let error = handler.handle(&payload).await.unwrap_err();
        assert!(error.is_terminal());
        assert_eq!(store.count_by_tenant("acme").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let (_dir, store, handler) = setup();
        let payload = serde_json::to_vec(&ActivityCreated::new(record())).unwrap();

        handler.handle(&payload).await.unwrap();
        handler.handle(&payload).await.unwrap();

        assert_eq!(store.count_by_tenant("acme").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_content_is_terminal() {
        let (_dir, _store, handler) = setup();
        let mut record = record();
        handler
            .handle(&serde_json::to_vec(&record).unwrap())
            .await
            .unwrap();

        record.formatted_message = "something else".to_string();
        let error = handler
            .handle(&serde_json::to_vec(&record).unwrap())
            .await
            .unwrap_err();
        assert!(error.is_terminal());
    }
}
