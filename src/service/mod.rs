//! Application facade over the cache-aside store and the ingestion stream
//!
//! Transports (HTTP, RPC) are expected to call [`ActivityService`]; writes are
//! published as events and persisted asynchronously by the consumer, reads go
//! through the cache-aside store.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::ledger::{Page, RecordFilter, RecordStore, StoreError};
use crate::messaging::{ActivityPublisher, StreamError};
use crate::record::{ActivityRecord, NewActivity, RecordId, RecordValidationError};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("tenant id is required")]
    MissingTenant,

    #[error("activity id is required")]
    MissingId,

    #[error("activity not found: {0}")]
    NotFound(RecordId),

    #[error("invalid activity: {0}")]
    Invalid(#[from] RecordValidationError),

    #[error("failed to publish activity: {0}")]
    Publish(#[from] StreamError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// One page of activities with paging metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityPage {
    pub records: Vec<ActivityRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl ActivityPage {
    fn new(result: Page, page: u32, limit: u32) -> Self {
        Self {
            total_pages: result.total.div_ceil(u64::from(limit)),
            records: result.records,
            total: result.total,
            page,
            limit,
        }
    }
}

/// Clamp paging input: page 0 reads as 1, a limit outside 1..=100 falls back to 10
pub fn normalize_paging(page: u32, limit: u32) -> (u32, u32) {
    let page = page.max(1);
    let limit = if (1..=MAX_LIMIT).contains(&limit) {
        limit
    } else {
        DEFAULT_LIMIT
    };
    (page, limit)
}

fn require_tenant(tenant_id: &str) -> Result<&str> {
    let tenant_id = tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(ServiceError::MissingTenant);
    }
    Ok(tenant_id)
}

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn RecordStore>,
    publisher: ActivityPublisher,
}

impl ActivityService {
    pub fn new(store: Arc<dyn RecordStore>, publisher: ActivityPublisher) -> Self {
        Self { store, publisher }
    }

    /// Build and validate a record, then publish it for asynchronous persistence
    pub async fn record_activity(&self, new: NewActivity) -> Result<ActivityRecord> {
        require_tenant(&new.tenant_id)?;
        let record = ActivityRecord::create(new)?;
        let seq = self.publisher.publish(&record).await?;

        info!(seq, record_id = %record.id, tenant_id = %record.tenant_id, "Activity accepted");
        Ok(record)
    }

    pub async fn get_activity(&self, id: &str) -> Result<ActivityRecord> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ServiceError::MissingId);
        }
        Ok(self.store.get_by_id(&RecordId::from(id)).await?)
    }

    pub async fn list_activities(&self, tenant_id: &str, page: u32, limit: u32) -> Result<ActivityPage> {
        let tenant_id = require_tenant(tenant_id)?;
        let (page, limit) = normalize_paging(page, limit);
        let result = self.store.get_by_tenant(tenant_id, page, limit).await?;
        Ok(ActivityPage::new(result, page, limit))
    }

    pub async fn count_activities(&self, tenant_id: &str) -> Result<u64> {
        let tenant_id = require_tenant(tenant_id)?;
        Ok(self.store.count_by_tenant(tenant_id).await?)
    }

    /// Filtered listing; always served by the durable store
    pub async fn search_activities(
        &self,
        tenant_id: &str,
        filter: &RecordFilter,
        page: u32,
        limit: u32,
    ) -> Result<ActivityPage> {
        let tenant_id = require_tenant(tenant_id)?;
        let (page, limit) = normalize_paging(page, limit);
        let result = self.store.query(tenant_id, filter, page, limit).await?;
        Ok(ActivityPage::new(result, page, limit))
    }
}
