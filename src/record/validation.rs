use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::model::ActivityRecord;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordValidationError {
    #[error("record id is required")]
    MissingId,
    #[error("tenant id is required")]
    MissingTenant,
    #[error("activity name is required")]
    MissingActivityName,
    #[error("object name is required")]
    MissingObjectName,
    #[error("object id is required")]
    MissingObjectId,
    #[error("formatted message is required")]
    MissingFormattedMessage,
    #[error("actor id is required")]
    MissingActorId,
    #[error("actor name is required")]
    MissingActorName,
    #[error("actor email '{0}' is not a valid address")]
    InvalidActorEmail(String),
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn validate_record(record: &ActivityRecord) -> Result<(), RecordValidationError> {
    if !record.id.is_valid() {
        return Err(RecordValidationError::MissingId);
    }
    if blank(&record.tenant_id) {
        return Err(RecordValidationError::MissingTenant);
    }
    if blank(&record.activity_name) {
        return Err(RecordValidationError::MissingActivityName);
    }
    if blank(&record.object_name) {
        return Err(RecordValidationError::MissingObjectName);
    }
    if blank(&record.object_id) {
        return Err(RecordValidationError::MissingObjectId);
    }
    if blank(&record.formatted_message) {
        return Err(RecordValidationError::MissingFormattedMessage);
    }
    if blank(&record.actor.id) {
        return Err(RecordValidationError::MissingActorId);
    }
    if blank(&record.actor.name) {
        return Err(RecordValidationError::MissingActorName);
    }
    if !is_valid_email(&record.actor.email) {
        return Err(RecordValidationError::InvalidActorEmail(
            record.actor.email.clone(),
        ));
    }

    Ok(())
}
