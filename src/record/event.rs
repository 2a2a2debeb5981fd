use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::ActivityRecord;

pub const ACTIVITY_CREATED_EVENT: &str = "activity_log_created";

/// Envelope published on the ingestion subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCreated {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: String,
    pub record: ActivityRecord,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl ActivityCreated {
    pub fn new(record: ActivityRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: ACTIVITY_CREATED_EVENT.to_string(),
            aggregate_id: record.id.to_string(),
            record,
            timestamp: Utc::now(),
            version: 1,
        }
    }
}

/// Payload shapes accepted by the ingestion handler: the event envelope, or a
/// bare record published by an older producer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingActivity {
    Event(ActivityCreated),
    Record(ActivityRecord),
}

impl IncomingActivity {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn into_record(self) -> ActivityRecord {
        match self {
            Self::Event(event) => event.record,
            Self::Record(record) => record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Actor, NewActivity};

    fn record() -> ActivityRecord {
        ActivityRecord::create(
            NewActivity::builder()
                .tenant_id("acme")
                .activity_name("user_created")
                .object_name("user")
                .object_id("u-1")
                .formatted_message("created")
                .actor(Actor::new("a1", "Admin", "admin@acme.test"))
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_event_envelope() {
        let event = ActivityCreated::new(record());
        let bytes = serde_json::to_vec(&event).unwrap();

        let incoming = IncomingActivity::decode(&bytes).unwrap();
        assert!(matches!(incoming, IncomingActivity::Event(_)));
        assert_eq!(incoming.into_record(), event.record);
    }

    #[test]
    fn test_decode_bare_record() {
        let record = record();
        let bytes = serde_json::to_vec(&record).unwrap();

        let incoming = IncomingActivity::decode(&bytes).unwrap();
        assert!(matches!(incoming, IncomingActivity::Record(_)));
        assert_eq!(incoming.into_record(), record);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(IncomingActivity::decode(b"{\"hello\": 1}").is_err());
        assert!(IncomingActivity::decode(b"not json").is_err());
    }

    #[test]
    fn test_envelope_metadata() {
        let event = ActivityCreated::new(record());
        assert_eq!(event.event_type, ACTIVITY_CREATED_EVENT);
        assert_eq!(event.aggregate_id, event.record.id.to_string());
        assert_eq!(event.version, 1);
    }
}
