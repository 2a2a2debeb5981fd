use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handlers::{JobError, JobHandler};
use crate::observability::Metrics;

pub type StartCallback = Box<dyn FnOnce() + Send + 'static>;
pub type SuccessCallback = Box<dyn FnOnce() + Send + 'static>;
pub type FailureCallback = Box<dyn FnOnce(JobError) + Send + 'static>;

/// Unit of work: a raw payload, the handler that processes it and the
/// callbacks reporting the outcome
pub struct Job {
    pub id: String,
    pub payload: Vec<u8>,
    handler: Arc<dyn JobHandler>,
    on_start: Option<StartCallback>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl Job {
    pub fn new(id: impl Into<String>, payload: Vec<u8>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            id: id.into(),
            payload,
            handler,
            on_start: None,
            on_success: None,
            on_failure: None,
        }
    }

    /// Called by the worker that picks the job up, before the handler runs
    pub fn on_start(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(JobError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Returned by [`WorkerPool::submit`] when the job was discarded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("worker pool is stopping, job {0} rejected")]
    Stopping(String),
}

/// Fixed set of worker tasks draining one shared bounded queue
///
/// Architecture:
/// 1. Producers call `submit(job)`; a full queue makes them wait (backpressure)
/// 2. `start(n)` spawns `n` workers that take turns receiving from the queue
/// 3. Each job runs on its own task under `job_timeout`, then exactly one
///    callback fires
/// 4. `stop()` lets running jobs finish and drops whatever is still queued
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: watch::Sender<bool>,
    stopping: AtomicBool,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    job_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    pub fn new(capacity: usize, job_timeout: Duration, metrics: Arc<Metrics>) -> Self {
        info!(capacity, ?job_timeout, "Creating worker pool");
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            shutdown,
            stopping: AtomicBool::new(false),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            job_timeout,
            metrics,
        }
    }

    /// Spawn `worker_count` workers. Only the first call has any effect.
    pub async fn start(&self, worker_count: usize) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already started, ignoring");
            return;
        }

        let mut workers = self.workers.lock().await;
        for worker_id in 0..worker_count {
            let handle = tokio::spawn(run_worker(
                worker_id,
                self.receiver.clone(),
                self.shutdown.subscribe(),
                self.job_timeout,
                self.metrics.clone(),
            ));
            workers.push(handle);
        }

        info!(worker_count, "Worker pool started");
    }

    /// Queue a job, waiting while the queue is full.
    ///
    /// A job submitted once `stop()` has begun is discarded: neither callback
    /// fires and the caller gets [`SubmitError::Stopping`].
    pub async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let mut shutdown = self.shutdown.subscribe();
        if self.stopping.load(Ordering::SeqCst) || *shutdown.borrow_and_update() {
            return Err(self.reject(job));
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => Err(self.reject(job)),
            permit = self.sender.reserve() => match permit {
                Ok(permit) => {
                    debug!(job_id = %job.id, "Job queued");
                    permit.send(job);
                    Ok(())
                }
                Err(_) => Err(self.reject(job)),
            },
        }
    }

    fn reject(&self, job: Job) -> SubmitError {
        self.metrics.job_rejected();
        warn!(job_id = %job.id, "Worker pool is stopping, job rejected");
        SubmitError::Stopping(job.id)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Stop accepting work, wait for every worker to finish its current job,
    /// then discard anything left in the queue.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            debug!("Worker pool stop already requested");
        }
        self.shutdown.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        let worker_count = workers.len();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        let mut dropped = 0usize;
        {
            let mut receiver = self.receiver.lock().await;
            while receiver.try_recv().is_ok() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, "Discarded queued jobs on shutdown");
        }

        info!(worker_count, "Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown: watch::Receiver<bool>,
    job_timeout: Duration,
    metrics: Arc<Metrics>,
) {
    debug!(worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        execute(worker_id, job, job_timeout, &metrics).await;
    }

    debug!(worker_id, "Worker exited");
}

async fn execute(worker_id: usize, job: Job, job_timeout: Duration, metrics: &Metrics) {
    let Job {
        id,
        payload,
        handler,
        on_start,
        on_success,
        on_failure,
    } = job;

    if let Some(callback) = on_start {
        guard_callback(&id, "start", callback);
    }

    let started = Instant::now();
    let task = tokio::spawn(async move { handler.handle(&payload).await });
    let abort = task.abort_handle();

    let outcome = match tokio::time::timeout(job_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(JobError::retryable(format!(
            "handler panicked: {join_error}"
        ))),
        Err(_) => {
            abort.abort();
            metrics.job_timed_out();
            Err(JobError::Timeout(job_timeout))
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => {
            metrics.job_processed();
            debug!(worker_id, job_id = %id, elapsed_ms, "Job succeeded");
            if let Some(callback) = on_success {
                guard_callback(&id, "success", callback);
            }
        }
        Err(e) => {
            metrics.job_failed();
            warn!(worker_id, job_id = %id, elapsed_ms, error = %e, "Job failed");
            if let Some(callback) = on_failure {
                guard_callback(&id, "failure", move || callback(e));
            }
        }
    }
}

/// Run an outcome callback, containing any panic to this job
fn guard_callback(job_id: &str, kind: &'static str, callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(job_id, callback = kind, "Job callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Succeed;

    #[async_trait]
    impl JobHandler for Succeed {
        async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
            Ok(())
        }
    }

    struct Sleep(Duration);

    #[async_trait]
    impl JobHandler for Sleep {
        async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    struct Panic;

    #[async_trait]
    impl JobHandler for Panic {
        async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
            panic!("handler blew up");
        }
    }

    fn pool(capacity: usize, timeout: Duration) -> (WorkerPool, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (WorkerPool::new(capacity, timeout, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_start_callback_fires_before_handler() {
        struct Check(Arc<AtomicUsize>);

        #[async_trait]
        impl JobHandler for Check {
            async fn handle(&self, _payload: &[u8]) -> Result<(), JobError> {
                match self.0.load(Ordering::SeqCst) {
                    1 => Ok(()),
                    n => Err(JobError::terminal(format!("start fired {n} times"))),
                }
            }
        }

        let (pool, _) = pool(4, Duration::from_secs(1));
        pool.start(1).await;

        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = Job::new("ordered", vec![], Arc::new(Check(started.clone())))
            .on_start(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move || {
                let _ = tx.send(());
            });
        pool.submit(job).await.unwrap();

        rx.await.expect("handler saw the start callback");
        assert_eq!(started.load(Ordering::SeqCst), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_timeout_reports_failure() {
        let (pool, metrics) = pool(4, Duration::from_millis(50));
        pool.start(1).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = Job::new("slow", vec![], Arc::new(Sleep(Duration::from_secs(5))))
            .on_failure(move |e| {
                let _ = tx.send(e);
            });
        pool.submit(job).await.unwrap();

        let error = rx.await.unwrap();
        assert_eq!(error, JobError::Timeout(Duration::from_millis(50)));
        assert_eq!(metrics.snapshot().jobs_timed_out, 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_handler_panic_is_a_failure() {
        let (pool, _) = pool(4, Duration::from_secs(1));
        pool.start(1).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = Job::new("boom", vec![], Arc::new(Panic)).on_failure(move |e| {
            let _ = tx.send(e);
        });
        pool.submit(job).await.unwrap();

        assert!(matches!(rx.await.unwrap(), JobError::Retryable(_)));

        // The worker survived and keeps processing
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = Job::new("after", vec![], Arc::new(Succeed)).on_success(move || {
            let _ = tx.send(());
        });
        pool.submit(job).await.unwrap();
        rx.await.unwrap();
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_kill_worker() {
        let (pool, metrics) = pool(4, Duration::from_secs(1));
        pool.start(1).await;

        pool.submit(Job::new("a", vec![], Arc::new(Succeed)).on_success(|| panic!("callback")))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(Job::new("b", vec![], Arc::new(Succeed)).on_success(move || {
            let _ = tx.send(());
        }))
        .await
        .unwrap();

        rx.await.unwrap();
        assert_eq!(metrics.snapshot().jobs_processed, 2);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_rejected_without_callbacks() {
        let (pool, metrics) = pool(4, Duration::from_secs(1));
        pool.start(2).await;
        pool.stop().await;

        let fired = Arc::new(AtomicUsize::new(0));
        let (on_ok, on_err) = (fired.clone(), fired.clone());
        let job = Job::new("late", vec![], Arc::new(Succeed))
            .on_success(move || {
                on_ok.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |_| {
                on_err.fetch_add(1, Ordering::SeqCst);
            });

        let result = pool.submit(job).await;
        assert_eq!(result, Err(SubmitError::Stopping("late".to_string())));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.snapshot().jobs_rejected, 1);
    }

    #[tokio::test]
    async fn test_blocked_submit_is_released_by_stop() {
        let (pool, _) = pool(1, Duration::from_secs(1));
        let pool = Arc::new(pool);

        // No workers: the first job fills the queue, the second waits
        pool.submit(Job::new("fills", vec![], Arc::new(Succeed))).await.unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(Job::new("waits", vec![], Arc::new(Succeed))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        pool.stop().await;
        let result = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let (pool, _) = pool(4, Duration::from_secs(1));
        pool.start(2).await;
        pool.start(3).await;

        assert_eq!(pool.workers.lock().await.len(), 2);
        pool.stop().await;
    }
}
