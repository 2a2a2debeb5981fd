/// Durable store for activity records
///
/// [`RecordStore`] is the authoritative persistence port. [`FjallRecordStore`]
/// implements it on Fjall (an embedded LSM key-value store):
///
/// - `records` partition holds each record as JSON, keyed by id
/// - `by_tenant` partition is a newest-first index used for tenant paging,
///   counting and filtered queries
///
/// Record and index writes are committed in a single batch, so a crash never
/// leaves an index entry without its record.
///
/// ## Usage
///
/// ```rust,ignore
/// use activitylog::ledger::{FjallRecordStore, RecordStore};
///
/// let store = FjallRecordStore::open("data/records")?;
/// store.create(&record).await?;
/// let page = store.get_by_tenant("acme", 1, 10).await?;
/// ```

pub mod error;
pub mod partitions;
pub mod store;
pub mod traits;

pub use error::{Result, StoreError};
pub use store::FjallRecordStore;
pub use traits::{Page, RecordFilter, RecordStore, page_offset};
