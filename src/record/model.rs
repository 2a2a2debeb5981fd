use std::fmt;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::validation::{RecordValidationError, validate_record};

/// Opaque, globally unique record identifier
///
/// Generated ids are UUIDv7 in simple (32 hex chars) form, so they sort by
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Snapshot of the actor at the time the activity happened.
///
/// This is a copy, not a live reference: renaming a user later does not
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Actor {
    /// Build an actor snapshot, trimming surrounding whitespace.
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
        }
    }
}

/// Input for a fresh activity record (id and timestamp are assigned on creation)
#[derive(Debug, Clone, Builder, Deserialize)]
#[builder(on(String, into))]
pub struct NewActivity {
    pub tenant_id: String,
    pub activity_name: String,
    pub object_name: String,
    pub object_id: String,
    #[serde(default)]
    pub changes: Option<Value>,
    pub formatted_message: String,
    pub actor: Actor,
}

/// Persisted activity fact
///
/// Every field except `changes` is required and non-empty. Records are never
/// mutated by the ingestion path once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: RecordId,
    #[serde(alias = "company_id")]
    pub tenant_id: String,
    pub activity_name: String,
    pub object_name: String,
    pub object_id: String,
    #[serde(default)]
    pub changes: Value,
    pub formatted_message: String,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Assign a fresh id and creation timestamp, then validate.
    pub fn create(new: NewActivity) -> Result<Self, RecordValidationError> {
        let record = Self {
            id: RecordId::generate(),
            tenant_id: new.tenant_id,
            activity_name: new.activity_name,
            object_name: new.object_name,
            object_id: new.object_id,
            changes: new.changes.unwrap_or(Value::Null),
            formatted_message: new.formatted_message,
            actor: Actor::new(new.actor.id, new.actor.name, new.actor.email),
            created_at: Utc::now(),
        };

        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_record(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NewActivity {
        NewActivity::builder()
            .tenant_id("acme")
            .activity_name("user_created")
            .object_name("user")
            .object_id("u-1")
            .changes(json!({"role": ["viewer", "admin"]}))
            .formatted_message("Admin created user u-1")
            .actor(Actor::new(" a1 ", "Admin", "admin@acme.test "))
            .build()
    }

    #[test]
    fn test_create_assigns_id_and_timestamp() {
        let before = Utc::now();
        let record = ActivityRecord::create(sample()).unwrap();

        assert_eq!(record.id.as_str().len(), 32);
        assert!(record.created_at >= before);
        assert_eq!(record.actor.id, "a1");
        assert_eq!(record.actor.email, "admin@acme.test");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ActivityRecord::create(sample()).unwrap();
        let b = ActivityRecord::create(sample()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_changes_becomes_null() {
        let mut new = sample();
        new.changes = None;
        let record = ActivityRecord::create(new).unwrap();
        assert_eq!(record.changes, Value::Null);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let mut new = sample();
        new.tenant_id = "  ".to_string();
        assert!(matches!(
            ActivityRecord::create(new),
            Err(RecordValidationError::MissingTenant)
        ));
    }

    #[test]
    fn test_json_accepts_company_id_alias() {
        let record = ActivityRecord::create(sample()).unwrap();
        let mut value = serde_json::to_value(&record).unwrap();
        let tenant = value.as_object_mut().unwrap().remove("tenant_id").unwrap();
        value["company_id"] = tenant;

        let decoded: ActivityRecord = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
    }
}
