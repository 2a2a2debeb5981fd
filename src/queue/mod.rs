//! Bounded worker pool
//!
//! Jobs are raw payloads paired with a [`JobHandler`](crate::handlers::JobHandler)
//! and success/failure callbacks. See [`WorkerPool`] for the lifecycle.

mod pool;

pub use pool::{FailureCallback, Job, StartCallback, SubmitError, SuccessCallback, WorkerPool};
