use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::error::Result;
use super::log::DeadLetter;

/// Durable, at-least-once message stream
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Append a message to `subject`, returning its sequence number
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64>;

    /// Open a named durable subscription. Delivery resumes from the first
    /// message on `subject` this durable has not acknowledged.
    async fn subscribe(&self, subject: &str, durable: &str) -> Result<Subscription> {
        self.subscribe_with(subject, durable, SubscribeOptions::default())
            .await
    }

    async fn subscribe_with(
        &self,
        subject: &str,
        durable: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription>;

    /// Messages the durable gave up on, oldest first
    async fn dead_letters(&self, durable: &str, limit: usize) -> Result<Vec<DeadLetter>>;

    async fn health(&self) -> Result<()>;

    /// Stop every subscription and release the underlying storage
    async fn close(&self) -> Result<()>;
}

/// Per-subscription delivery limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Deliveries handed out but not yet settled; `None` means unbounded
    pub max_ack_pending: Option<usize>,
}

impl SubscribeOptions {
    pub fn max_ack_pending(limit: usize) -> Self {
        Self {
            max_ack_pending: Some(limit.max(1)),
        }
    }
}

/// Settles one delivery on behalf of a subscription
pub trait Acker: Send + Sync {
    fn ack(&self, seq: u64) -> Result<()>;

    /// Work on `attempt` has started; restart its `ack_wait` timer
    fn in_progress(&self, seq: u64, attempt: u32) -> Result<()>;

    /// Request redelivery of `attempt` now
    fn nak(&self, seq: u64, attempt: u32) -> Result<()>;

    /// Give up on the message: never redeliver it
    fn term(&self, seq: u64, attempt: u32, reason: &str) -> Result<()>;
}

/// Cloneable acknowledgement handle for one delivery
#[derive(Clone)]
pub struct AckHandle {
    seq: u64,
    attempt: u32,
    acker: Arc<dyn Acker>,
}

impl AckHandle {
    pub fn new(seq: u64, attempt: u32, acker: Arc<dyn Acker>) -> Self {
        Self { seq, attempt, acker }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn ack(&self) -> Result<()> {
        self.acker.ack(self.seq)
    }

    pub fn in_progress(&self) -> Result<()> {
        self.acker.in_progress(self.seq, self.attempt)
    }

    pub fn nak(&self) -> Result<()> {
        self.acker.nak(self.seq, self.attempt)
    }

    pub fn term(&self, reason: &str) -> Result<()> {
        self.acker.term(self.seq, self.attempt, reason)
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("seq", &self.seq)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// One delivery of a message to a durable subscription
#[derive(Debug)]
pub struct Delivery {
    pub seq: u64,
    pub subject: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on each redelivery
    pub attempt: u32,
    pub handle: AckHandle,
}

/// Live durable subscription; deliveries arrive through [`Subscription::next`]
pub struct Subscription {
    durable: String,
    deliveries: mpsc::Receiver<Delivery>,
    cancel: watch::Sender<bool>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        durable: impl Into<String>,
        deliveries: mpsc::Receiver<Delivery>,
        cancel: watch::Sender<bool>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            durable: durable.into(),
            deliveries,
            cancel,
            pump: Some(pump),
        }
    }

    pub fn durable(&self) -> &str {
        &self.durable
    }

    /// Next delivery, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Stop delivery. Unacknowledged messages stay pending for the next
    /// subscription under the same durable name.
    pub async fn unsubscribe(mut self) {
        self.cancel.send_replace(true);
        self.deliveries.close();

        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                error!(durable = %self.durable, error = %e, "Subscription pump ended abnormally");
            }
        }
        debug!(durable = %self.durable, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
