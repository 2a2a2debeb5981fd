//! Worker pool delivery, failure isolation and shutdown

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use activitylog::handlers::{JobError, JobHandler};
use activitylog::observability::Metrics;
use activitylog::queue::{Job, WorkerPool};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Succeeds unless the payload is `fail`, counting invocations per payload
#[derive(Default)]
struct Recorder {
    invocations: Mutex<HashMap<Vec<u8>, usize>>,
}

#[async_trait]
impl JobHandler for Recorder {
    async fn handle(&self, payload: &[u8]) -> Result<(), JobError> {
        *self
            .invocations
            .lock()
            .unwrap()
            .entry(payload.to_vec())
            .or_default() += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;

        if payload == b"fail" {
            return Err(JobError::retryable("deterministic failure"));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Success(String),
    Failure(String),
}

fn job(id: &str, payload: &[u8], handler: Arc<Recorder>, tx: mpsc::UnboundedSender<Outcome>) -> Job {
    let (ok_tx, ok_id) = (tx.clone(), id.to_string());
    let (err_tx, err_id) = (tx, id.to_string());
    Job::new(id, payload.to_vec(), handler)
        .on_success(move || {
            let _ = ok_tx.send(Outcome::Success(ok_id));
        })
        .on_failure(move |_| {
            let _ = err_tx.send(Outcome::Failure(err_id));
        })
}

#[tokio::test]
async fn test_every_job_succeeds_exactly_once() {
    const JOBS: usize = 50;
    let pool = WorkerPool::new(100, Duration::from_secs(5), Arc::new(Metrics::new()));
    pool.start(4).await;

    let handler = Arc::new(Recorder::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    for i in 0..JOBS {
        let id = format!("job-{i}");
        pool.submit(job(&id, id.as_bytes(), handler.clone(), tx.clone()))
            .await
            .unwrap();
    }
    drop(tx);

    let mut successes = 0;
    for _ in 0..JOBS {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            Some(Outcome::Success(_)) => successes += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    pool.stop().await;

    assert_eq!(successes, JOBS);
    assert!(rx.recv().await.is_none());
    let invocations = handler.invocations.lock().unwrap();
    assert_eq!(invocations.len(), JOBS);
    assert!(invocations.values().all(|count| *count == 1));
}

#[tokio::test]
async fn test_failing_job_is_isolated() {
    let metrics = Arc::new(Metrics::new());
    let pool = WorkerPool::new(100, Duration::from_secs(5), metrics.clone());
    pool.start(3).await;

    let handler = Arc::new(Recorder::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    pool.submit(job("bad", b"fail", handler.clone(), tx.clone())).await.unwrap();
    for i in 0..5 {
        let id = format!("good-{i}");
        pool.submit(job(&id, id.as_bytes(), handler.clone(), tx.clone()))
            .await
            .unwrap();
    }
    drop(tx);

    let mut outcomes = Vec::new();
    while let Ok(Some(outcome)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        outcomes.push(outcome);
    }
    pool.stop().await;

    let failures: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Failure(_)))
        .collect();
    assert_eq!(failures, vec![&Outcome::Failure("bad".to_string())]);
    assert!(!outcomes.contains(&Outcome::Success("bad".to_string())));
    assert_eq!(outcomes.len(), 6);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.jobs_failed, 1);
    assert_eq!(snapshot.jobs_processed, 5);
}

struct Slow(Arc<AtomicUsize>);

#[async_trait]
impl JobHandler for Slow {
    async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_stop_waits_for_running_jobs_and_drops_queued_ones() {
    let pool = WorkerPool::new(10, Duration::from_secs(5), Arc::new(Metrics::new()));
    pool.start(1).await;

    let completed = Arc::new(AtomicUsize::new(0));
    let callbacks = Arc::new(AtomicUsize::new(0));
    for i in 0..5 {
        let callbacks = callbacks.clone();
        pool.submit(
            Job::new(format!("slow-{i}"), vec![], Arc::new(Slow(completed.clone()))).on_success(
                move || {
                    callbacks.fetch_add(1, Ordering::SeqCst);
                },
            ),
        )
        .await
        .unwrap();
    }

    // Let the single worker pick up the first job
    tokio::time::sleep(Duration::from_millis(20)).await;
    tokio::time::timeout(Duration::from_secs(2), pool.stop())
        .await
        .expect("stop hung");

    // The running job finished; the rest were discarded without callbacks
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);

    let late = pool
        .submit(Job::new("late", vec![], Arc::new(Slow(completed.clone()))))
        .await;
    assert!(late.is_err());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_bounded_by_job_timeout() {
    struct Forever;

    #[async_trait]
    impl JobHandler for Forever {
        async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    let pool = WorkerPool::new(4, Duration::from_millis(100), Arc::new(Metrics::new()));
    pool.start(2).await;
    pool.submit(Job::new("stuck", vec![], Arc::new(Forever))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::timeout(Duration::from_secs(2), pool.stop())
        .await
        .expect("stop hung");
}
