//! `serve` runtime: wires the components together, runs the event consumer
//! and exposes `/health` and `/metrics` until a shutdown signal arrives.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::cache::{Cache, MokaCache};
use crate::config::Config;
use crate::handlers::PersistActivityHandler;
use crate::ledger::{FjallRecordStore, RecordStore};
use crate::messaging::{ConsumerSettings, EventConsumer, FjallStream, MessageStream, StreamSettings};
use crate::notify::{LogNotifier, Outbox, RetryPolicy};
use crate::observability::Metrics;
use crate::queue::WorkerPool;
use crate::repository::{CacheTtls, CachedRecordStore};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies of the ops endpoints
#[derive(Clone)]
pub struct OpsState {
    pub cache: Arc<dyn Cache>,
    pub store: Arc<dyn RecordStore>,
    pub stream: Arc<dyn MessageStream>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    cache: &'static str,
    store: &'static str,
    stream: &'static str,
}

fn component_status<E: std::fmt::Display>(component: &'static str, result: Result<(), E>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(e) => {
            warn!(component, error = %e, "Health check failed");
            "unavailable"
        }
    }
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<OpsState>) -> impl IntoResponse {
    let report = HealthReport {
        status: "ok",
        cache: component_status("cache", state.cache.ping().await),
        store: component_status("store", state.store.health().await),
        stream: component_status("stream", state.stream.health().await),
    };

    let healthy = [report.cache, report.store, report.stream]
        .iter()
        .all(|status| *status == "ok");
    if healthy {
        (StatusCode::OK, Json(report))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport {
                status: "degraded",
                ..report
            }),
        )
    }
}

async fn metrics(State(state): State<OpsState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Run the consumer and the ops endpoints until SIGINT/SIGTERM
pub async fn serve(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    let durable_store = FjallRecordStore::open(&config.storage.path)?;
    let cache: Arc<dyn Cache> = Arc::new(MokaCache::new(config.cache.max_capacity));
    let store: Arc<dyn RecordStore> = Arc::new(CachedRecordStore::new(
        Arc::new(durable_store.clone()),
        cache.clone(),
        CacheTtls::from(&config.cache),
        metrics.clone(),
    ));
    let stream: Arc<dyn MessageStream> = Arc::new(FjallStream::open(
        &config.stream.path,
        StreamSettings::from(&config.stream),
    )?);

    let outbox = config.notify.enabled.then(|| {
        Arc::new(Outbox::start(
            Arc::new(LogNotifier),
            RetryPolicy::from(&config.notify),
            config.notify.queue_capacity,
            metrics.clone(),
        ))
    });

    let mut handler = PersistActivityHandler::new(store.clone());
    if let Some(outbox) = &outbox {
        handler = handler.with_outbox(outbox.clone());
    }

    let pool = Arc::new(WorkerPool::new(
        config.worker.queue_capacity,
        config.worker.job_timeout.as_duration(),
        metrics.clone(),
    ));
    let consumer = EventConsumer::new(
        stream.clone(),
        pool,
        Arc::new(handler),
        ConsumerSettings::from_config(&config.stream, &config.worker, &config.consumer),
        metrics.clone(),
    );
    consumer.start().await?;

    let app = router(OpsState {
        cache,
        store,
        stream,
        metrics,
    });
    let address = config.server.health_addr;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Ops endpoints listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    consumer.stop().await;
    if let Some(outbox) = &outbox {
        outbox.shutdown().await;
    }
    if let Err(e) = durable_store.persist() {
        error!(error = %e, "Failed to persist record store");
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
