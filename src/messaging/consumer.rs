use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::StreamError;
use super::stream::{AckHandle, Delivery, MessageStream, SubscribeOptions, Subscription};
use crate::config::{ConsumerConfig, StreamConfig, WorkerConfig};
use crate::handlers::{JobError, JobHandler};
use crate::observability::Metrics;
use crate::queue::{Job, WorkerPool};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Subscription failed: {0}")]
    Subscribe(#[from] StreamError),

    #[error("Consumer already started")]
    AlreadyStarted,
}

/// Subscription and acknowledgement policy for an [`EventConsumer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub subject: String,
    pub durable: String,
    pub worker_count: usize,
    /// Dead-letter terminal failures instead of redelivering them
    pub ack_terminal_failures: bool,
    /// Nak a delivery whose job the pool refused
    pub nak_on_rejection: bool,
}

impl ConsumerSettings {
    pub fn from_config(stream: &StreamConfig, worker: &WorkerConfig, consumer: &ConsumerConfig) -> Self {
        Self {
            subject: stream.subject.clone(),
            durable: stream.durable.clone(),
            worker_count: worker.count,
            ack_terminal_failures: consumer.ack_terminal_failures,
            nak_on_rejection: consumer.nak_on_rejection,
        }
    }
}

/// Bridges a durable subscription into the worker pool
///
/// Per message: received → dispatched as a [`Job`] → marked in progress when a
/// worker picks it up → acked on success, naked or dead-lettered on failure.
/// At most `worker_count` deliveries are unsettled at once, so a message never
/// waits in the pool queue long enough for its `ack_wait` to run out. Shutdown
/// order is unsubscribe, then pool stop, then stream close.
pub struct EventConsumer {
    stream: Arc<dyn MessageStream>,
    pool: Arc<WorkerPool>,
    handler: Arc<dyn JobHandler>,
    settings: ConsumerSettings,
    metrics: Arc<Metrics>,
    shutdown: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(
        stream: Arc<dyn MessageStream>,
        pool: Arc<WorkerPool>,
        handler: Arc<dyn JobHandler>,
        settings: ConsumerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            stream,
            pool,
            handler,
            settings,
            metrics,
            shutdown,
            dispatcher: Mutex::new(None),
        }
    }

    /// Start the worker pool, open the durable subscription and begin dispatching
    pub async fn start(&self) -> Result<(), ConsumerError> {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            return Err(ConsumerError::AlreadyStarted);
        }

        self.pool.start(self.settings.worker_count).await;
        let subscription = self
            .stream
            .subscribe_with(
                &self.settings.subject,
                &self.settings.durable,
                SubscribeOptions::max_ack_pending(self.settings.worker_count),
            )
            .await?;

        let dispatch = Dispatch {
            pool: self.pool.clone(),
            handler: self.handler.clone(),
            settings: self.settings.clone(),
            metrics: self.metrics.clone(),
        };
        *dispatcher = Some(tokio::spawn(dispatch.run(subscription, self.shutdown.subscribe())));

        info!(
            subject = %self.settings.subject,
            durable = %self.settings.durable,
            workers = self.settings.worker_count,
            "Event consumer started"
        );
        Ok(())
    }

    /// Unsubscribe, stop the pool (running jobs finish), then close the stream
    pub async fn stop(&self) {
        info!("Stopping event consumer");
        self.shutdown.send_replace(true);

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch loop ended abnormally");
            }
        }

        self.pool.stop().await;

        if let Err(e) = self.stream.close().await {
            error!(error = %e, "Failed to close stream");
        }
        info!("Event consumer stopped");
    }
}

struct Dispatch {
    pool: Arc<WorkerPool>,
    handler: Arc<dyn JobHandler>,
    settings: ConsumerSettings,
    metrics: Arc<Metrics>,
}

impl Dispatch {
    async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                delivery = subscription.next() => delivery,
            };

            let Some(delivery) = delivery else {
                warn!(durable = %subscription.durable(), "Subscription ended unexpectedly");
                break;
            };

            if !self.dispatch(delivery, &mut shutdown).await {
                break;
            }
        }

        subscription.unsubscribe().await;
        debug!("Dispatch loop exited");
    }

    /// Submit one delivery; returns false on shutdown or once the pool refuses work
    async fn dispatch(&self, delivery: Delivery, shutdown: &mut watch::Receiver<bool>) -> bool {
        let Delivery {
            seq,
            subject,
            payload,
            attempt,
            handle,
        } = delivery;
        debug!(seq, attempt, %subject, "Dispatching message");

        let job = Job::new(format!("{subject}:{seq}"), payload, self.handler.clone())
            .on_start(on_start(handle.clone()))
            .on_success(on_success(handle.clone(), self.metrics.clone()))
            .on_failure(on_failure(
                handle.clone(),
                self.settings.ack_terminal_failures,
                self.metrics.clone(),
            ));

        let (accepted, keep_going) = tokio::select! {
            biased;
            result = self.pool.submit(job) => (result.is_ok(), true),
            _ = shutdown.changed() => (false, false),
        };

        if accepted {
            return keep_going;
        }

        if self.settings.nak_on_rejection {
            settle_nak(&handle, &self.metrics);
        } else {
            warn!(seq, "Job not accepted, leaving message for redelivery");
        }
        // A stopping pool never accepts work again
        false
    }
}

fn on_start(handle: AckHandle) -> impl FnOnce() + Send + 'static {
    move || {
        if let Err(e) = handle.in_progress() {
            warn!(seq = handle.seq(), error = %e, "Failed to mark message in progress");
        }
    }
}

fn on_success(handle: AckHandle, metrics: Arc<Metrics>) -> impl FnOnce() + Send + 'static {
    move || match handle.ack() {
        Ok(()) => metrics.message_acked(),
        Err(e) => error!(seq = handle.seq(), error = %e, "Failed to acknowledge message"),
    }
}

fn on_failure(
    handle: AckHandle,
    ack_terminal_failures: bool,
    metrics: Arc<Metrics>,
) -> impl FnOnce(JobError) + Send + 'static {
    move |error| {
        if error.is_terminal() && ack_terminal_failures {
            match handle.term(&error.to_string()) {
                Ok(()) => metrics.message_terminated(),
                Err(e) => error!(seq = handle.seq(), error = %e, "Failed to dead-letter message"),
            }
        } else {
            settle_nak(&handle, &metrics);
        }
    }
}

fn settle_nak(handle: &AckHandle, metrics: &Metrics) {
    match handle.nak() {
        Ok(()) => metrics.message_nacked(),
        Err(e) => error!(seq = handle.seq(), error = %e, "Failed to nak message"),
    }
}
