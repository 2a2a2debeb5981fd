//! Event streaming
//!
//! - [`MessageStream`] - durable, at-least-once stream port
//! - [`FjallStream`] - embedded implementation over a fjall [`StreamLog`]
//! - [`ActivityPublisher`] - emits `activity_log_created` events
//! - [`EventConsumer`] - feeds a durable subscription into the worker pool
//!   and turns job outcomes into ack / nak / term

mod consumer;
mod durable;
pub mod error;
mod log;
mod publisher;
mod stream;

pub use consumer::{ConsumerError, ConsumerSettings, EventConsumer};
pub use durable::{FjallStream, StreamSettings};
pub use error::{Result, StreamError};
pub use log::{DeadLetter, StoredMessage, StreamLog};
pub use publisher::ActivityPublisher;
pub use stream::{AckHandle, Acker, Delivery, MessageStream, SubscribeOptions, Subscription};
