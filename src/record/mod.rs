//! Activity records: the immutable "activity happened" facts this service stores.
//!
//! - [`ActivityRecord`] - the persisted fact, owned by exactly one tenant
//! - [`NewActivity`] - builder input for constructing a fresh record
//! - [`ActivityCreated`] - event envelope carried on the ingestion stream
//!
//! ## Example
//!
//! ```rust
//! use activitylog::record::{ActivityRecord, Actor, NewActivity};
//!
//! let new = NewActivity::builder()
//!     .tenant_id("acme")
//!     .activity_name("user_created")
//!     .object_name("user")
//!     .object_id("u-1")
//!     .formatted_message("Admin created user u-1")
//!     .actor(Actor::new("a1", "Admin", "admin@acme.test"))
//!     .build();
//!
//! let record = ActivityRecord::create(new).unwrap();
//! assert!(!record.id.as_str().is_empty());
//! ```

mod event;
mod model;
mod validation;

pub use event::{ACTIVITY_CREATED_EVENT, ActivityCreated, IncomingActivity};
pub use model::{ActivityRecord, Actor, NewActivity, RecordId};
pub use validation::{RecordValidationError, is_valid_email, validate_record};
