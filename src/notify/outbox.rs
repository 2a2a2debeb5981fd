use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Notifier, NotifyError};
use crate::config::NotifyConfig;
use crate::observability::Metrics;
use crate::record::ActivityRecord;

/// Exponential backoff between delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1 << exponent)
    }
}

impl From<&NotifyConfig> for RetryPolicy {
    fn from(config: &NotifyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff.as_duration(),
        }
    }
}

/// Bounded notification queue drained by one dispatch task
pub struct Outbox {
    sender: mpsc::Sender<ActivityRecord>,
    shutdown: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Outbox {
    /// Spawn the dispatch task and return the handle used to enqueue
    pub fn start(
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        capacity: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        info!(capacity, max_attempts = policy.max_attempts, "Starting notification outbox");
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let dispatcher = tokio::spawn(dispatch(receiver, shutdown_rx, notifier, policy, metrics));

        Self {
            sender,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Queue a notification without waiting
    pub fn enqueue(&self, record: ActivityRecord) -> Result<(), NotifyError> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }

    /// Stop accepting notifications, deliver what is queued, wait for the dispatcher
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let Some(handle) = self.dispatcher.lock().await.take() else {
            return;
        };
        if let Err(e) = handle.await {
            error!(error = %e, "Notification dispatcher ended abnormally");
        }
        info!("Notification outbox drained");
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<ActivityRecord>,
    mut shutdown: watch::Receiver<bool>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
) {
    let mut closing = false;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed(), if !closing => {
                closing = true;
                receiver.close();
            }
            next = receiver.recv() => match next {
                Some(record) => deliver(&notifier, record, policy, &metrics).await,
                None => break,
            },
        }
    }

    debug!("Notification dispatcher exited");
}

async fn deliver(
    notifier: &Arc<dyn Notifier>,
    record: ActivityRecord,
    policy: RetryPolicy,
    metrics: &Metrics,
) {
    let record = Arc::new(record);

    for attempt in 1..=policy.max_attempts {
        let attempt_result = {
            let notifier = notifier.clone();
            let record = record.clone();
            tokio::spawn(async move { notifier.notify(&record).await }).await
        };

        let error = match attempt_result {
            Ok(Ok(())) => {
                metrics.notification_sent();
                debug!(record_id = %record.id, attempt, "Notification delivered");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("notifier panicked: {join_error}"),
        };

        if attempt == policy.max_attempts {
            metrics.notification_failed();
            error!(record_id = %record.id, attempt, error, "Notification abandoned");
            return;
        }

        let delay = policy.delay(attempt);
        warn!(record_id = %record.id, attempt, ?delay, error, "Notification failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Actor, NewActivity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record() -> ActivityRecord {
        ActivityRecord::create(
            NewActivity::builder()
                .tenant_id("acme")
                .activity_name("user_created")
                .object_name("user")
                .object_id("u-1")
                .formatted_message("created")
                .actor(Actor::new("a1", "Admin", "admin@acme.test"))
                .build(),
        )
        .unwrap()
    }

    /// Fails the first `failures` calls, then succeeds
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for Flaky {
        async fn notify(&self, _record: &ActivityRecord) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(NotifyError::Delivery("smtp down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let notifier = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let outbox = Outbox::start(notifier.clone(), policy(3), 8, metrics.clone());

        outbox.enqueue(record()).unwrap();
        outbox.shutdown().await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().notifications_sent, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let notifier = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let outbox = Outbox::start(notifier.clone(), policy(2), 8, metrics.clone());

        outbox.enqueue(record()).unwrap();
        outbox.shutdown().await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.snapshot().notifications_failed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_then_rejects() {
        let notifier = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let outbox = Outbox::start(notifier.clone(), policy(1), 8, Arc::new(Metrics::new()));

        for _ in 0..5 {
            outbox.enqueue(record()).unwrap();
        }
        outbox.shutdown().await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 5);
        assert_eq!(outbox.enqueue(record()), Err(NotifyError::Closed));
    }

    struct Stuck;

    #[async_trait]
    impl Notifier for Stuck {
        async fn notify(&self, _record: &ActivityRecord) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let outbox = Outbox::start(Arc::new(Stuck), policy(1), 1, Arc::new(Metrics::new()));

        // One in flight, one queued, the next is refused
        outbox.enqueue(record()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        outbox.enqueue(record()).unwrap();

        assert_eq!(outbox.enqueue(record()), Err(NotifyError::QueueFull));
    }
}
