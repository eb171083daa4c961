//! Durable-queue collaborator boundary and the in-process implementation.
//!
//! Production deployments put a real broker behind [`JobQueue`]; the
//! contract the core relies on is at-least-once delivery, job-id
//! deduplication while pending, delayed readiness and per-key rate
//! limiting. [`MemoryQueue`] implements the same contract in-process for
//! tests and single-node operation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::limit::ApiRateLimiter;

use super::job::{JobKind, JobOptions, JobPayload};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {message}")]
    Unavailable { message: String },

    #[error("queue internal error: {message}")]
    Internal { message: String },
}

/// Handler outcome: retryable failures go back on the queue with backoff,
/// fatal ones are dropped after logging.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("retryable job failure: {0}")]
    Retryable(String),

    #[error("fatal job failure: {0}")]
    Fatal(String),
}

/// Consumer side of the queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: JobPayload) -> Result<(), JobError>;
}

/// Producer side of the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job. Returns false when a pending job with the same id
    /// already exists (deduplicated, nothing enqueued).
    async fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<bool, QueueError>;

    /// Number of pending (not yet claimed) jobs of a kind.
    async fn pending_count(&self, kind: JobKind) -> Result<usize, QueueError>;

    /// Remove all pending jobs of a kind. Returns how many were removed.
    async fn clear_pending(&self, kind: JobKind) -> Result<usize, QueueError>;
}

struct QueuedJob {
    id: String,
    payload: JobPayload,
    ready_at: Instant,
    attempts_left: u32,
    backoff: Duration,
    rate_limit_key: Option<String>,
}

#[derive(Default)]
struct Inner {
    jobs: Vec<QueuedJob>,
    pending_ids: HashSet<String>,
    limiters: HashMap<String, ApiRateLimiter>,
}

/// In-process queue with the collaborator contract.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    /// Requests per second granted to each rate-limit key.
    rate_limit_rps: u32,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            rate_limit_rps: crate::limit::CHAT_DEFAULT_RPS,
        }
    }

    #[must_use]
    pub fn with_rate_limit_rps(mut self, rps: u32) -> Self {
        self.rate_limit_rps = rps.max(1);
        self
    }

    /// Total pending jobs of any kind.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    /// Claim the next ready job, if any.
    async fn pop_ready(&self) -> Option<QueuedJob> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let index = inner.jobs.iter().position(|job| job.ready_at <= now)?;
        let job = inner.jobs.remove(index);
        inner.pending_ids.remove(&job.id);
        Some(job)
    }

    /// The earliest time any pending job becomes ready.
    async fn next_ready_at(&self) -> Option<Instant> {
        let inner = self.inner.lock().await;
        inner.jobs.iter().map(|job| job.ready_at).min()
    }

    async fn limiter_for(&self, key: &str) -> ApiRateLimiter {
        let mut inner = self.inner.lock().await;
        inner
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| ApiRateLimiter::new(self.rate_limit_rps))
            .clone()
    }

    async fn requeue(&self, mut job: QueuedJob) {
        job.attempts_left -= 1;
        job.ready_at = Instant::now() + job.backoff;
        job.backoff = job.backoff.saturating_mul(2);

        let mut inner = self.inner.lock().await;
        inner.pending_ids.insert(job.id.clone());
        inner.jobs.push(job);
    }

    /// Run one claimed job through the handler, applying rate limiting and
    /// the retry/backoff policy.
    async fn process_job(&self, job: QueuedJob, handler: &dyn JobHandler) {
        if let Some(key) = &job.rate_limit_key {
            self.limiter_for(key).await.wait().await;
        }

        match handler.handle(job.payload.clone()).await {
            Ok(()) => {}
            Err(JobError::Retryable(message)) => {
                if job.attempts_left > 1 {
                    tracing::warn!(
                        job_id = %job.id,
                        attempts_left = job.attempts_left - 1,
                        retry_in_ms = job.backoff.as_millis() as u64,
                        error = %message,
                        "Job failed, retrying with backoff"
                    );
                    self.requeue(job).await;
                } else {
                    tracing::error!(
                        job_id = %job.id,
                        error = %message,
                        "Job failed after exhausting retries, dropping"
                    );
                }
            }
            Err(JobError::Fatal(message)) => {
                tracing::error!(job_id = %job.id, error = %message, "Job failed fatally, dropping");
            }
        }
    }

    /// Worker loop: claim and process jobs until the shutdown flag is set.
    pub async fn run_worker(&self, handler: Arc<dyn JobHandler>, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.pop_ready().await {
                Some(job) => self.process_job(job, handler.as_ref()).await,
                None => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    }

    /// Spawn `concurrency` worker tasks sharing one handler.
    pub fn spawn_workers(
        &self,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..concurrency.max(1))
            .map(|_| {
                let queue = self.clone();
                let handler = Arc::clone(&handler);
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move { queue.run_worker(handler, shutdown).await })
            })
            .collect()
    }

    /// Process jobs (waiting out delays) until the queue is empty.
    ///
    /// Single-threaded and deterministic, which is exactly what tests and
    /// one-shot CLI runs want. Returns the number of jobs processed.
    pub async fn run_until_idle(&self, handler: &dyn JobHandler) -> usize {
        let mut processed = 0usize;

        loop {
            match self.pop_ready().await {
                Some(job) => {
                    self.process_job(job, handler).await;
                    processed += 1;
                }
                None => match self.next_ready_at().await {
                    Some(ready_at) => tokio::time::sleep_until(ready_at).await,
                    None => break,
                },
            }
        }

        processed
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<bool, QueueError> {
        let id = options
            .job_id
            .clone()
            .unwrap_or_else(|| payload.default_job_id());

        let mut inner = self.inner.lock().await;
        if inner.pending_ids.contains(&id) {
            tracing::debug!(job_id = %id, "Duplicate pending job, deduplicated");
            return Ok(false);
        }

        let ready_at = Instant::now() + options.delay.unwrap_or(Duration::ZERO);
        inner.pending_ids.insert(id.clone());
        inner.jobs.push(QueuedJob {
            id,
            payload,
            ready_at,
            attempts_left: options.attempts.max(1),
            backoff: options.backoff_initial,
            rate_limit_key: options.rate_limit_key,
        });

        Ok(true)
    }

    async fn pending_count(&self, kind: JobKind) -> Result<usize, QueueError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .iter()
            .filter(|job| job.payload.kind() == kind)
            .count())
    }

    async fn clear_pending(&self, kind: JobKind) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().await;
        let before = inner.jobs.len();

        let removed_ids: Vec<String> = inner
            .jobs
            .iter()
            .filter(|job| job.payload.kind() == kind)
            .map(|job| job.id.clone())
            .collect();

        inner.jobs.retain(|job| job.payload.kind() != kind);
        for id in &removed_ids {
            inner.pending_ids.remove(id);
        }

        Ok(before - inner.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sync_job(name: &str) -> JobPayload {
        JobPayload::PackageSync {
            name: name.to_string(),
            seq: None,
            deleted: false,
        }
    }

    struct CountingHandler {
        handled: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                handled: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing_first(count: usize) -> Self {
            Self {
                handled: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(count),
            }
        }
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _payload: JobPayload) -> Result<(), JobError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(JobError::Retryable("induced failure".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueue_deduplicates_pending_job_ids() {
        let queue = MemoryQueue::new();

        assert!(
            queue
                .enqueue(sync_job("left-pad"), JobOptions::default())
                .await
                .unwrap()
        );
        assert!(
            !queue
                .enqueue(sync_job("left-pad"), JobOptions::default())
                .await
                .unwrap()
        );
        assert_eq!(queue.len().await, 1);

        // A different package is a different id.
        assert!(
            queue
                .enqueue(sync_job("lodash"), JobOptions::default())
                .await
                .unwrap()
        );
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn claimed_jobs_free_their_id_for_re_enqueue() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(sync_job("left-pad"), JobOptions::default())
            .await
            .unwrap();

        let job = queue.pop_ready().await.expect("job is ready");
        assert_eq!(job.id, "sync:left-pad");

        // In-flight jobs no longer block a fresh enqueue; at worst the
        // package gets one extra refresh, which the upsert absorbs.
        assert!(
            queue
                .enqueue(sync_job("left-pad"), JobOptions::default())
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_jobs_are_not_ready_early() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(
                JobPayload::BackfillTick,
                JobOptions::default().with_delay(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        assert!(queue.pop_ready().await.is_none());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(queue.pop_ready().await.is_some());
    }

    #[tokio::test]
    async fn pending_count_and_clear_are_kind_scoped() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(sync_job("a"), JobOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(sync_job("b"), JobOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(JobPayload::BackfillTick, JobOptions::default())
            .await
            .unwrap();

        assert_eq!(queue.pending_count(JobKind::PackageSync).await.unwrap(), 2);
        assert_eq!(queue.pending_count(JobKind::BackfillTick).await.unwrap(), 1);

        assert_eq!(queue.clear_pending(JobKind::BackfillTick).await.unwrap(), 1);
        assert_eq!(queue.pending_count(JobKind::BackfillTick).await.unwrap(), 0);
        assert_eq!(queue.pending_count(JobKind::PackageSync).await.unwrap(), 2);

        // A cleared id can be enqueued again.
        assert!(
            queue
                .enqueue(JobPayload::BackfillTick, JobOptions::default())
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_idle_retries_with_backoff_until_success() {
        let queue = MemoryQueue::new();
        let handler = CountingHandler::failing_first(2);

        queue
            .enqueue(
                sync_job("flaky"),
                JobOptions::default().with_attempts(5),
            )
            .await
            .unwrap();

        let processed = queue.run_until_idle(&handler).await;
        // Two failures plus the final success.
        assert_eq!(processed, 3);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_attempts_are_exhausted() {
        let queue = MemoryQueue::new();
        let handler = CountingHandler::failing_first(10);

        queue
            .enqueue(
                sync_job("doomed"),
                JobOptions::default().with_attempts(3),
            )
            .await
            .unwrap();

        let processed = queue.run_until_idle(&handler).await;
        assert_eq!(processed, 3);
        assert!(queue.is_empty().await, "exhausted jobs are dropped");
    }

    #[tokio::test]
    async fn workers_drain_the_queue_and_stop_on_shutdown() {
        let queue = MemoryQueue::new();
        let handler = Arc::new(CountingHandler::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        for i in 0..20 {
            queue
                .enqueue(sync_job(&format!("pkg-{i}")), JobOptions::default())
                .await
                .unwrap();
        }

        let handles = queue.spawn_workers(
            Arc::clone(&handler) as Arc<dyn JobHandler>,
            4,
            Arc::clone(&shutdown),
        );

        // Wait for the queue to drain.
        for _ in 0..100 {
            if queue.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.await.expect("worker should stop cleanly");
        }

        assert_eq!(handler.handled.load(Ordering::SeqCst), 20);
    }
}
