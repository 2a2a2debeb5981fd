//! Ephemeral cache port
//!
//! The [`Cache`] trait is the seam between the cache-aside repository and a
//! concrete key/value cache. Values are opaque bytes; [`CacheExt`] adds typed
//! JSON helpers on top. [`MokaCache`] is the in-process implementation.

pub mod error;
pub mod keys;
mod memory;

pub use memory::MokaCache;
pub use error::{CacheError, Result};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a Redis-style glob, returning how many were removed
    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;

    async fn flush_all(&self) -> Result<()>;
}

/// Typed JSON access for any [`Cache`]
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, Bytes::from(bytes), ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
