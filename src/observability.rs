//! Observability: metrics counters and tracing setup
//!
//! [`Metrics`] is created once by the binary and handed to every component
//! constructor as `Arc<Metrics>`; nothing reads it through a global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_timed_out: AtomicU64,
    messages_acked: AtomicU64,
    messages_nacked: AtomicU64,
    messages_terminated: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    store_operations: AtomicU64,
    store_failures: AtomicU64,
    store_latency_micros: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(counter = name, "Metric incremented");
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_processed(&self) {
        bump(&self.jobs_processed, "jobs_processed");
    }

    pub fn job_failed(&self) {
        bump(&self.jobs_failed, "jobs_failed");
    }

    pub fn job_rejected(&self) {
        bump(&self.jobs_rejected, "jobs_rejected");
    }

    pub fn job_timed_out(&self) {
        bump(&self.jobs_timed_out, "jobs_timed_out");
    }

    pub fn message_acked(&self) {
        bump(&self.messages_acked, "messages_acked");
    }

    pub fn message_nacked(&self) {
        bump(&self.messages_nacked, "messages_nacked");
    }

    pub fn message_terminated(&self) {
        bump(&self.messages_terminated, "messages_terminated");
    }

    pub fn cache_hit(&self) {
        bump(&self.cache_hits, "cache_hits");
    }

    pub fn cache_miss(&self) {
        bump(&self.cache_misses, "cache_misses");
    }

    pub fn cache_error(&self) {
        bump(&self.cache_errors, "cache_errors");
    }

    pub fn notification_sent(&self) {
        bump(&self.notifications_sent, "notifications_sent");
    }

    pub fn notification_failed(&self) {
        bump(&self.notifications_failed, "notifications_failed");
    }

    /// Record one durable store round trip
    pub fn store_operation(&self, operation: &'static str, elapsed: Duration, ok: bool) {
        self.store_operations.fetch_add(1, Ordering::Relaxed);
        self.store_latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !ok {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(
            operation,
            elapsed_us = elapsed.as_micros() as u64,
            ok,
            "Store operation recorded"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            jobs_processed: load(&self.jobs_processed),
            jobs_failed: load(&self.jobs_failed),
            jobs_rejected: load(&self.jobs_rejected),
            jobs_timed_out: load(&self.jobs_timed_out),
            messages_acked: load(&self.messages_acked),
            messages_nacked: load(&self.messages_nacked),
            messages_terminated: load(&self.messages_terminated),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            cache_errors: load(&self.cache_errors),
            store_operations: load(&self.store_operations),
            store_failures: load(&self.store_failures),
            store_latency_micros: load(&self.store_latency_micros),
            notifications_sent: load(&self.notifications_sent),
            notifications_failed: load(&self.notifications_failed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_rejected: u64,
    pub jobs_timed_out: u64,
    pub messages_acked: u64,
    pub messages_nacked: u64,
    pub messages_terminated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub store_operations: u64,
    pub store_failures: u64,
    pub store_latency_micros: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}
