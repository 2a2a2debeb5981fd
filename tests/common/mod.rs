#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use activitylog::cache::{Cache, CacheError};
use activitylog::ledger::{FjallRecordStore, Page, RecordFilter, RecordStore, Result};
use activitylog::record::{ActivityRecord, Actor, NewActivity, RecordId};
use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

pub fn new_activity(tenant: &str) -> NewActivity {
    NewActivity::builder()
        .tenant_id(tenant)
        .activity_name("user_created")
        .object_name("user")
        .object_id("u-1")
        .formatted_message("Admin created user u-1")
        .actor(Actor::new("a1", "Admin", "admin@acme.test"))
        .build()
}

pub fn record(tenant: &str) -> ActivityRecord {
    ActivityRecord::create(new_activity(tenant)).unwrap()
}

/// Durable store double counting reads that reach it
pub struct CountingStore {
    inner: FjallRecordStore,
    pub get_by_id_calls: AtomicUsize,
    pub get_by_tenant_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
}

impl CountingStore {
    pub fn open(dir: &TempDir) -> Arc<Self> {
        Arc::new(Self {
            inner: FjallRecordStore::open(dir.path().join("records")).unwrap(),
            get_by_id_calls: AtomicUsize::new(0),
            get_by_tenant_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
        })
    }

    pub fn by_id(&self) -> usize {
        self.get_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn by_tenant(&self) -> usize {
        self.get_by_tenant_calls.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn create(&self, record: &ActivityRecord) -> Result<()> {
        self.inner.create(record).await
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<ActivityRecord> {
        self.get_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id).await
    }

    async fn get_by_tenant(&self, tenant_id: &str, page: u32, limit: u32) -> Result<Page> {
        self.get_by_tenant_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_tenant(tenant_id, page, limit).await
    }

    async fn count_by_tenant(&self, tenant_id: &str) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.count_by_tenant(tenant_id).await
    }

    async fn query(
        &self,
        tenant_id: &str,
        filter: &RecordFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page> {
        self.inner.query(tenant_id, filter, page, limit).await
    }

    async fn update(&self, record: &ActivityRecord) -> Result<()> {
        self.inner.update(record).await
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn health(&self) -> Result<()> {
        self.inner.health().await
    }
}

/// Cache whose every operation fails, as if the cache server were unreachable
pub struct DownCache;

fn down<T>() -> std::result::Result<T, CacheError> {
    Err(CacheError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl Cache for DownCache {
    async fn get(&self, _key: &str) -> std::result::Result<Option<Bytes>, CacheError> {
        down()
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> std::result::Result<(), CacheError> {
        down()
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
        down()
    }

    async fn delete_by_pattern(&self, _pattern: &str) -> std::result::Result<usize, CacheError> {
        down()
    }

    async fn exists(&self, _key: &str) -> std::result::Result<bool, CacheError> {
        down()
    }

    async fn ping(&self) -> std::result::Result<(), CacheError> {
        down()
    }

    async fn flush_all(&self) -> std::result::Result<(), CacheError> {
        down()
    }
}
