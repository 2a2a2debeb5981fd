use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;
use crate::record::{ActivityRecord, RecordId};

/// One page of a tenant-scoped listing plus the tenant's total match count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<ActivityRecord>,
    pub total: u64,
}

/// Optional narrowing criteria for tenant queries; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub object_id: Option<String>,
    pub activity_name: Option<String>,
    pub actor_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if let Some(object_id) = &self.object_id {
            if &record.object_id != object_id {
                return false;
            }
        }
        if let Some(activity_name) = &self.activity_name {
            if &record.activity_name != activity_name {
                return false;
            }
        }
        if let Some(actor_id) = &self.actor_id {
            if &record.actor.id != actor_id {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Number of index entries to skip for a 1-based page (page 0 reads as page 1)
pub fn page_offset(page: u32, limit: u32) -> usize {
    (page.max(1) as usize - 1) * limit as usize
}

/// Authoritative durable store for activity records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record; fails with `Conflict` if the id already exists
    async fn create(&self, record: &ActivityRecord) -> Result<()>;

    /// Fetch one record; fails with `NotFound` if absent
    async fn get_by_id(&self, id: &RecordId) -> Result<ActivityRecord>;

    /// Newest-first page of a tenant's records with the tenant's total count
    async fn get_by_tenant(&self, tenant_id: &str, page: u32, limit: u32) -> Result<Page>;

    async fn count_by_tenant(&self, tenant_id: &str) -> Result<u64>;

    /// Newest-first page of a tenant's records narrowed by `filter`
    async fn query(
        &self,
        tenant_id: &str,
        filter: &RecordFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page>;

    async fn update(&self, record: &ActivityRecord) -> Result<()>;

    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// Health check - verify the store is reachable
    async fn health(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Actor;
    use chrono::Duration;
    use serde_json::Value;

    fn record() -> ActivityRecord {
        ActivityRecord {
            id: RecordId::from("r1"),
            tenant_id: "acme".to_string(),
            activity_name: "user_created".to_string(),
            object_name: "user".to_string(),
            object_id: "u-1".to_string(),
            changes: Value::Null,
            formatted_message: "created".to_string(),
            actor: Actor::new("a1", "Admin", "admin@acme.test"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(RecordFilter::default().matches(&record()));
    }

    #[test]
    fn test_filter_fields() {
        let record = record();

        let filter = RecordFilter {
            object_id: Some("u-1".to_string()),
            actor_id: Some("a1".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&record));

        let filter = RecordFilter {
            activity_name: Some("user_deleted".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let record = record();
        let filter = RecordFilter {
            created_after: Some(record.created_at),
            created_before: Some(record.created_at),
            ..Default::default()
        };
        assert!(filter.matches(&record));

        let filter = RecordFilter {
            created_after: Some(record.created_at + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(0, 10), 0);
    }
}
