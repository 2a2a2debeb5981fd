use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::{Result, StreamError};
use super::log::{DeadLetter, StreamLog};
use super::stream::{AckHandle, Acker, Delivery, MessageStream, SubscribeOptions, Subscription};
use crate::config::StreamConfig;

/// Deliveries buffered between a pump and its subscriber
const DELIVERY_BUFFER: usize = 1;

/// Redelivery policy shared by every subscription of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub ack_wait: Duration,
    pub max_deliver: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(60),
            max_deliver: 3,
        }
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            ack_wait: config.ack_wait.as_duration(),
            max_deliver: config.max_deliver.max(1),
        }
    }
}

struct Inner {
    log: StreamLog,
    settings: StreamSettings,
    published: watch::Sender<u64>,
    closed: watch::Sender<bool>,
    active: Mutex<HashSet<String>>,
}

/// Embedded durable stream over a fjall [`StreamLog`]
///
/// Each durable subscription runs a pump task that:
/// 1. scans the log for messages on its subject the durable has not acknowledged
/// 2. hands them out one delivery at a time, starting an `ack_wait` timer that
///    an in-progress signal restarts, with at most `max_ack_pending` unsettled
/// 3. redelivers on nak or timer expiry, dead-lettering once `max_deliver`
///    deliveries have failed
#[derive(Clone)]
pub struct FjallStream {
    inner: Arc<Inner>,
}

impl FjallStream {
    pub fn open<P: AsRef<Path>>(path: P, settings: StreamSettings) -> Result<Self> {
        let log = StreamLog::open(path)?;
        let (published, _) = watch::channel(log.current_seq());
        let (closed, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                log,
                settings,
                published,
                closed,
                active: Mutex::new(HashSet::new()),
            }),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.inner.closed.borrow() {
            return Err(StreamError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStream for FjallStream {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64> {
        self.ensure_open()?;
        let seq = self.inner.log.append(subject, &payload)?;
        self.inner.published.send_replace(seq);
        Ok(seq)
    }

    async fn subscribe_with(
        &self,
        subject: &str,
        durable: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        self.ensure_open()?;
        if !self.inner.active.lock().await.insert(durable.to_string()) {
            return Err(StreamError::DurableInUse(durable.to_string()));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (deliveries_tx, deliveries_rx) = mpsc::channel(DELIVERY_BUFFER);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let acker = Arc::new(DurableAcker {
            log: self.inner.log.clone(),
            durable: durable.to_string(),
            commands: commands_tx,
        });

        let pump = Pump {
            inner: self.inner.clone(),
            subject: subject.to_string(),
            durable: durable.to_string(),
            cursor: 0,
            max_ack_pending: options.max_ack_pending.unwrap_or(usize::MAX),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            attempts: HashMap::new(),
            acker,
        };
        let handle = tokio::spawn(pump.run(commands_rx, deliveries_tx, cancel_rx));

        info!(subject, durable, max_ack_pending = ?options.max_ack_pending, "Durable subscription opened");
        Ok(Subscription::new(durable, deliveries_rx, cancel_tx, handle))
    }

    async fn dead_letters(&self, durable: &str, limit: usize) -> Result<Vec<DeadLetter>> {
        self.inner.log.dead_letters(durable, limit)
    }

    async fn health(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.log.health_check()
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.send_replace(true) {
            return Ok(());
        }
        self.inner.log.flush()?;
        info!("Stream closed");
        Ok(())
    }
}

enum AckCommand {
    /// Acked or terminated; already recorded in the log
    Settled(u64),
    Progress { seq: u64, attempt: u32 },
    Nak { seq: u64, attempt: u32 },
}

struct DurableAcker {
    log: StreamLog,
    durable: String,
    commands: mpsc::UnboundedSender<AckCommand>,
}

impl DurableAcker {
    fn notify(&self, command: AckCommand) {
        // Pump gone means the subscription ended; the log already holds the outcome
        let _ = self.commands.send(command);
    }
}

impl Acker for DurableAcker {
    fn ack(&self, seq: u64) -> Result<()> {
        self.log.ack(&self.durable, seq)?;
        self.notify(AckCommand::Settled(seq));
        Ok(())
    }

    fn in_progress(&self, seq: u64, attempt: u32) -> Result<()> {
        self.notify(AckCommand::Progress { seq, attempt });
        Ok(())
    }

    fn nak(&self, seq: u64, attempt: u32) -> Result<()> {
        self.notify(AckCommand::Nak { seq, attempt });
        Ok(())
    }

    fn term(&self, seq: u64, attempt: u32, reason: &str) -> Result<()> {
        self.log.dead_letter(&self.durable, seq, reason, attempt)?;
        self.notify(AckCommand::Settled(seq));
        Ok(())
    }
}

struct InFlight {
    attempt: u32,
    deadline: Instant,
}

enum Event<'a> {
    Stop,
    Command(AckCommand),
    Deliver(mpsc::Permit<'a, Delivery>),
    Wake,
}

struct Pump {
    inner: Arc<Inner>,
    subject: String,
    durable: String,
    cursor: u64,
    max_ack_pending: usize,
    ready: VecDeque<u64>,
    in_flight: HashMap<u64, InFlight>,
    attempts: HashMap<u64, u32>,
    acker: Arc<DurableAcker>,
}

impl Pump {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<AckCommand>,
        deliveries: mpsc::Sender<Delivery>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let mut published = self.inner.published.subscribe();
        let mut closed = self.inner.closed.subscribe();
        debug!(durable = %self.durable, "Subscription pump started");

        loop {
            if *cancel.borrow() || *closed.borrow() {
                break;
            }

            published.borrow_and_update();
            if let Err(e) = self.scan() {
                error!(durable = %self.durable, error = %e, "Stream scan failed");
            }
            self.expire(Instant::now());

            let next_deadline = self.in_flight.values().map(|f| f.deadline).min();
            let has_ready =
                !self.ready.is_empty() && self.in_flight.len() < self.max_ack_pending;

            let event = tokio::select! {
                biased;
                _ = cancel.changed() => Event::Stop,
                _ = closed.changed() => Event::Stop,
                Some(command) = commands.recv() => Event::Command(command),
                permit = deliveries.reserve(), if has_ready => match permit {
                    Ok(permit) => Event::Deliver(permit),
                    Err(_) => Event::Stop,
                },
                _ = published.changed() => Event::Wake,
                _ = sleep_until(next_deadline), if next_deadline.is_some() => Event::Wake,
            };

            match event {
                Event::Stop => break,
                Event::Command(command) => self.apply(command),
                Event::Deliver(permit) => self.deliver(permit),
                Event::Wake => {}
            }
        }

        self.inner.active.lock().await.remove(&self.durable);
        debug!(
            durable = %self.durable,
            pending = self.ready.len() + self.in_flight.len(),
            "Subscription pump stopped"
        );
    }

    /// Queue every unacknowledged message on our subject past the cursor
    fn scan(&mut self) -> Result<()> {
        for message in self.inner.log.read_from(self.cursor) {
            let message = message?;
            self.cursor = message.seq + 1;

            if message.subject != self.subject {
                continue;
            }
            if self.inner.log.is_acked(&self.durable, message.seq)? {
                continue;
            }
            self.ready.push_back(message.seq);
        }
        Ok(())
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<(u64, u32)> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.deadline <= now)
            .map(|(seq, flight)| (*seq, flight.attempt))
            .collect();

        for (seq, attempt) in expired {
            warn!(durable = %self.durable, seq, attempt, "Ack wait expired");
            self.retry(seq, attempt, "ack wait expired");
        }
    }

    fn apply(&mut self, command: AckCommand) {
        match command {
            AckCommand::Settled(seq) => {
                self.in_flight.remove(&seq);
                self.attempts.remove(&seq);
            }
            AckCommand::Progress { seq, attempt } => {
                let ack_wait = self.inner.settings.ack_wait;
                if let Some(flight) = self.in_flight.get_mut(&seq) {
                    if flight.attempt == attempt {
                        flight.deadline = Instant::now() + ack_wait;
                    }
                }
            }
            AckCommand::Nak { seq, attempt } => {
                let current = self.in_flight.get(&seq).map(|flight| flight.attempt);
                if current == Some(attempt) {
                    debug!(durable = %self.durable, seq, attempt, "Negative acknowledgement");
                    self.retry(seq, attempt, "negative acknowledgement");
                }
            }
        }
    }

    /// Requeue a failed delivery, or dead-letter it once deliveries are exhausted
    fn retry(&mut self, seq: u64, attempt: u32, reason: &str) {
        self.in_flight.remove(&seq);

        if attempt < self.inner.settings.max_deliver {
            self.ready.push_back(seq);
            return;
        }

        self.attempts.remove(&seq);
        let reason = format!("max deliveries ({attempt}) exhausted, last failure: {reason}");
        if let Err(e) = self.inner.log.dead_letter(&self.durable, seq, &reason, attempt) {
            error!(durable = %self.durable, seq, error = %e, "Failed to dead-letter message");
        }
    }

    fn deliver(&mut self, permit: mpsc::Permit<'_, Delivery>) {
        let Some(seq) = self.ready.pop_front() else {
            return;
        };

        let message = match self.inner.log.is_acked(&self.durable, seq) {
            Ok(true) => return,
            Ok(false) => self.inner.log.get(seq),
            Err(e) => Err(e),
        };
        let message = match message {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(durable = %self.durable, seq, "Message vanished from log");
                return;
            }
            Err(e) => {
                // Left for the next subscription to pick up
                error!(durable = %self.durable, seq, error = %e, "Failed to load message");
                return;
            }
        };

        let attempt = {
            let count = self.attempts.entry(seq).or_insert(0);
            *count += 1;
            *count
        };
        self.in_flight.insert(
            seq,
            InFlight {
                attempt,
                deadline: Instant::now() + self.inner.settings.ack_wait,
            },
        );

        debug!(durable = %self.durable, seq, attempt, "Delivering message");
        permit.send(Delivery {
            seq,
            subject: message.subject,
            payload: message.payload,
            attempt,
            handle: AckHandle::new(seq, attempt, self.acker.clone()),
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
