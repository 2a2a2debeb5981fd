//! Job handlers run by the worker pool
//!
//! - [`JobHandler`] - the `(payload) -> success | failure` seam
//! - [`JobError`] - failure classified as retryable, terminal or timed out
//! - [`PersistActivityHandler`] - decodes an activity event and stores the record

mod activity;
mod traits;

pub use activity::PersistActivityHandler;
pub use traits::{JobError, JobHandler};
