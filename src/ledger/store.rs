use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::partitions::{
    decode_tenant_key, encode_record_key, encode_tenant_key, encode_tenant_prefix,
};
use super::traits::{Page, RecordFilter, RecordStore, page_offset};
use crate::record::{ActivityRecord, RecordId};

/// Fjall-backed durable store for activity records
#[derive(Clone)]
pub struct FjallRecordStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    by_tenant: PartitionHandle,
    /// Serializes read-check-commit writes so the tenant index never diverges
    writes: Arc<Mutex<()>>,
}

impl FjallRecordStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening record store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let by_tenant = keyspace.open_partition("by_tenant", PartitionCreateOptions::default())?;

        info!("Record store opened successfully");
        Ok(Self {
            keyspace,
            records,
            by_tenant,
            writes: Arc::new(Mutex::new(())),
        })
    }

    fn read(&self, id: &RecordId) -> Result<Option<ActivityRecord>> {
        match self.records.get(encode_record_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Record ids of one tenant, newest first
    fn tenant_ids(&self, tenant_id: &str) -> impl Iterator<Item = Result<RecordId>> + '_ {
        self.by_tenant
            .prefix(encode_tenant_prefix(tenant_id))
            .map(|item| {
                let (key, _) = item?;
                decode_tenant_key(&key)
                    .map(|(_, id)| id)
                    .ok_or_else(|| StoreError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))
            })
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, id: &RecordId) -> Result<ActivityRecord> {
        self.read(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FjallRecordStore {
    async fn create(&self, record: &ActivityRecord) -> Result<()> {
        let key = encode_record_key(&record.id);
        let _guard = self.write_guard();
        if self.records.contains_key(&key)? {
            return Err(StoreError::Conflict(record.id.clone()));
        }

        let value = serde_json::to_vec(record)?;
        let index_key = encode_tenant_key(&record.tenant_id, record.created_at, &record.id);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.records, key, value);
        batch.insert(&self.by_tenant, index_key, record.id.as_str().as_bytes());
        batch.commit()?;

        debug!(record_id = %record.id, tenant_id = %record.tenant_id, "Created activity record");
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<ActivityRecord> {
        self.load(id)
    }

    async fn get_by_tenant(&self, tenant_id: &str, page: u32, limit: u32) -> Result<Page> {
        self.query(tenant_id, &RecordFilter::default(), page, limit)
            .await
    }

    async fn count_by_tenant(&self, tenant_id: &str) -> Result<u64> {
        let mut total = 0;
        for item in self.by_tenant.prefix(encode_tenant_prefix(tenant_id)) {
            item?;
            total += 1;
        }
        Ok(total)
    }

    async fn query(
        &self,
        tenant_id: &str,
        filter: &RecordFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page> {
        let offset = page_offset(page, limit);
        let mut records = Vec::new();
        let mut total = 0u64;

        let unfiltered = filter.is_empty();

        for id in self.tenant_ids(tenant_id) {
            let id = id?;
            let position = total as usize;
            let in_window = position >= offset && records.len() < limit as usize;

            // Without criteria only the page window needs decoding.
            if unfiltered {
                total += 1;
                if in_window {
                    records.push(self.load(&id)?);
                }
                continue;
            }

            let record = self.load(&id)?;
            if !filter.matches(&record) {
                continue;
            }
            total += 1;
            if in_window {
                records.push(record);
            }
        }

        debug!(tenant_id, page, limit, total, "Queried tenant records");
        Ok(Page { records, total })
    }

    async fn update(&self, record: &ActivityRecord) -> Result<()> {
        let _guard = self.write_guard();
        let previous = self.load(&record.id)?;

        let mut batch = self.keyspace.batch();
        batch.remove(
            &self.by_tenant,
            encode_tenant_key(&previous.tenant_id, previous.created_at, &previous.id),
        );
        batch.insert(
            &self.by_tenant,
            encode_tenant_key(&record.tenant_id, record.created_at, &record.id),
            record.id.as_str().as_bytes(),
        );
        batch.insert(
            &self.records,
            encode_record_key(&record.id),
            serde_json::to_vec(record)?,
        );
        batch.commit()?;

        debug!(record_id = %record.id, "Updated activity record");
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let _guard = self.write_guard();
        let previous = self.load(id)?;

        let mut batch = self.keyspace.batch();
        batch.remove(
            &self.by_tenant,
            encode_tenant_key(&previous.tenant_id, previous.created_at, id),
        );
        batch.remove(&self.records, encode_record_key(id));
        batch.commit()?;

        debug!(record_id = %id, "Deleted activity record");
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let _ = self.records.first_key_value()?;
        Ok(())
    }
}
