//! Cache-aside record store
//!
//! [`CachedRecordStore`] decorates any [`RecordStore`] with an ephemeral
//! [`Cache`]. The durable store stays authoritative:
//!
//! - writes go to the durable store first and only then touch the cache
//! - a write deletes the tenant's derived list/count entries, it never rewrites them
//! - any cache failure is logged and counted, then treated as a miss
//!
//! Staleness is bounded by the entry TTLs plus invalidation latency; a read
//! racing a write on another task may still see the previous page.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheExt, keys};
use crate::config::CacheConfig;
use crate::ledger::{Page, RecordFilter, RecordStore, Result};
use crate::observability::Metrics;
use crate::record::{ActivityRecord, RecordId};

/// Lifetimes of the three kinds of cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub item: Duration,
    pub list: Duration,
    pub count: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            item: Duration::from_secs(3_600),
            list: Duration::from_secs(1_800),
            count: Duration::from_secs(300),
        }
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            item: config.item_ttl.as_duration(),
            list: config.list_ttl.as_duration(),
            count: config.count_ttl.as_duration(),
        }
    }
}

pub struct CachedRecordStore {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn Cache>,
    ttls: CacheTtls,
    metrics: Arc<Metrics>,
}

impl CachedRecordStore {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn Cache>,
        ttls: CacheTtls,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            ttls,
            metrics,
        }
    }

    /// Run one durable store call and record its latency
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        self.metrics
            .store_operation(operation, started.elapsed(), result.is_ok());
        result
    }

    async fn cached<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        match self.cache.get_json::<T>(key).await {
            Ok(Some(value)) => {
                self.metrics.cache_hit();
                debug!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                self.metrics.cache_miss();
                None
            }
            Err(e) => {
                self.metrics.cache_error();
                self.metrics.cache_miss();
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn fill<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize + Sync,
    {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            self.metrics.cache_error();
            warn!(key, error = %e, "Cache write failed");
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            self.metrics.cache_error();
            warn!(key, error = %e, "Cache delete failed");
        }
    }

    /// Drop every derived list and count entry of a tenant
    async fn invalidate_tenant(&self, tenant_id: &str) {
        let pattern = keys::list_pattern(tenant_id);
        match self.cache.delete_by_pattern(&pattern).await {
            Ok(deleted) => debug!(tenant_id, deleted, "Invalidated tenant list cache"),
            Err(e) => {
                self.metrics.cache_error();
                warn!(tenant_id, error = %e, "Tenant list invalidation failed");
            }
        }
        self.forget(&keys::count_key(tenant_id)).await;
    }
}

#[async_trait]
impl RecordStore for CachedRecordStore {
    async fn create(&self, record: &ActivityRecord) -> Result<()> {
        self.timed("create", self.store.create(record)).await?;

        self.fill(&keys::item_key(&record.id), record, self.ttls.item)
            .await;
        self.invalidate_tenant(&record.tenant_id).await;
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<ActivityRecord> {
        let key = keys::item_key(id);
        if let Some(record) = self.cached::<ActivityRecord>(&key).await {
            return Ok(record);
        }

        let record = self.timed("get_by_id", self.store.get_by_id(id)).await?;
        self.fill(&key, &record, self.ttls.item).await;
        Ok(record)
    }

    async fn get_by_tenant(&self, tenant_id: &str, page: u32, limit: u32) -> Result<Page> {
        let key = keys::list_key(tenant_id, page, limit);
        if let Some(cached) = self.cached::<Page>(&key).await {
            return Ok(cached);
        }

        let result = self
            .timed("get_by_tenant", self.store.get_by_tenant(tenant_id, page, limit))
            .await?;
        self.fill(&key, &result, self.ttls.list).await;
        for record in &result.records {
            self.fill(&keys::item_key(&record.id), record, self.ttls.item)
                .await;
        }
        Ok(result)
    }

    async fn count_by_tenant(&self, tenant_id: &str) -> Result<u64> {
        let key = keys::count_key(tenant_id);
        if let Some(count) = self.cached::<u64>(&key).await {
            return Ok(count);
        }

        let count = self
            .timed("count_by_tenant", self.store.count_by_tenant(tenant_id))
            .await?;
        self.fill(&key, &count, self.ttls.count).await;
        Ok(count)
    }

    async fn query(
        &self,
        tenant_id: &str,
        filter: &RecordFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page> {
        self.timed("query", self.store.query(tenant_id, filter, page, limit))
            .await
    }

    async fn update(&self, record: &ActivityRecord) -> Result<()> {
        let previous = self.timed("get_by_id", self.store.get_by_id(&record.id)).await?;
        self.timed("update", self.store.update(record)).await?;

        self.forget(&keys::item_key(&record.id)).await;
        self.invalidate_tenant(&record.tenant_id).await;
        if previous.tenant_id != record.tenant_id {
            self.invalidate_tenant(&previous.tenant_id).await;
        }
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let previous = self.timed("get_by_id", self.store.get_by_id(id)).await?;
        self.timed("delete", self.store.delete(id)).await?;

        self.forget(&keys::item_key(id)).await;
        self.invalidate_tenant(&previous.tenant_id).await;
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.store.health().await
    }
}
