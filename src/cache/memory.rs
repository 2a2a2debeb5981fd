use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use globset::GlobBuilder;
use moka::Expiry;
use moka::future::Cache as MokaInner;
use tracing::{debug, info};

use super::error::{CacheError, Result};
use super::Cache;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    ttl: Duration,
}

/// Expire each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process ephemeral cache backed by moka
#[derive(Clone)]
pub struct MokaCache {
    inner: MokaInner<String, CacheEntry>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        info!(max_capacity, "Building in-process cache");
        let inner = MokaInner::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }

    /// Number of live entries after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            self.inner.invalidate(key).await;
            return Ok(());
        }
        self.inner
            .insert(key.to_string(), CacheEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let doomed: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| matcher.is_match(key.as_str()))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &doomed {
            self.inner.invalidate(key).await;
        }

        debug!(pattern, deleted = doomed.len(), "Deleted cache keys by pattern");
        Ok(doomed.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.contains_key(key))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }
}
