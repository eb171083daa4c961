//! Backfill orchestrator: the resumable state machine that drives the
//! cold-start full-registry sync in bounded ticks.
//!
//! All state lives in a single persisted row behind
//! [`BackfillStateStore`]; every write is a compare-and-swap on a version
//! token, so a lost race reloads instead of overwriting. Ticks are
//! single-flight in-process (a `try_lock` guard) and effectively
//! single-flight across the deployment via the tick job's dedup id and the
//! queue's concurrency — the latter is a soft guarantee, and the CAS turns
//! any race that slips through into a harmless no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::entity::backfill_state::Model as BackfillState;
use crate::entity::backfill_status::BackfillStatus;
use crate::queries::{self, StoreError};
use crate::registry::{PackageListing, RegistryClient, RegistryError};

use super::job::{JobKind, JobOptions, JobPayload};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::queue::{JobQueue, QueueError};

/// Default names enqueued per drain tick.
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Default delay between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("backfill is already running")]
    AlreadyRunning,

    #[error("invalid backfill transition from {from} to {to}")]
    InvalidTransition {
        from: BackfillStatus,
        to: BackfillStatus,
    },

    #[error("backfill state write conflict, another writer won")]
    Conflict,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("queue error during backfill: {0}")]
    Queue(#[from] QueueError),

    #[error("registry listing failed: {0}")]
    Listing(#[from] RegistryError),
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Status was not `running`; nothing to do.
    Noop,
    /// Another tick was already in flight.
    Skipped,
    /// A drain tick enqueued a batch and advanced the offset.
    Advanced { offset: u64, total: u64 },
    /// The backfill finished (either a one-tick cold start or the final
    /// drain).
    Completed { total: u64 },
}

/// Persistence boundary for the backfill: the singleton state row plus the
/// stored package universe.
#[async_trait]
pub trait BackfillStateStore: Send + Sync {
    /// Load the state row, creating it lazily.
    async fn load(&self) -> Result<BackfillState, StoreError>;

    /// Conditionally write `state` when the stored version still equals
    /// `expected_version`; bumps the version on success.
    async fn compare_and_swap(
        &self,
        expected_version: i64,
        state: &BackfillState,
    ) -> Result<bool, StoreError>;

    /// Append a listing batch to the stored universe.
    async fn append_packages(&self, start_position: u64, names: &[String])
    -> Result<(), StoreError>;

    /// Read `limit` names from the universe starting at `offset`.
    async fn package_slice(&self, offset: u64, limit: u64) -> Result<Vec<String>, StoreError>;

    /// Drop the stored universe.
    async fn clear_packages(&self) -> Result<(), StoreError>;
}

/// Database-backed store.
pub struct DbStateStore {
    db: DatabaseConnection,
}

impl DbStateStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BackfillStateStore for DbStateStore {
    async fn load(&self) -> Result<BackfillState, StoreError> {
        queries::backfill::load_or_init(&self.db).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        state: &BackfillState,
    ) -> Result<bool, StoreError> {
        queries::backfill::compare_and_swap(&self.db, expected_version, state).await
    }

    async fn append_packages(
        &self,
        start_position: u64,
        names: &[String],
    ) -> Result<(), StoreError> {
        queries::backfill::append_packages(&self.db, start_position, names).await?;
        Ok(())
    }

    async fn package_slice(&self, offset: u64, limit: u64) -> Result<Vec<String>, StoreError> {
        queries::backfill::package_slice(&self.db, offset, limit).await
    }

    async fn clear_packages(&self) -> Result<(), StoreError> {
        queries::backfill::clear_packages(&self.db).await?;
        Ok(())
    }
}

/// In-memory store for tests.
pub struct MemoryStateStore {
    state: Mutex<BackfillState>,
    packages: Mutex<Vec<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackfillState::initial()),
            packages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BackfillStateStore for MemoryStateStore {
    async fn load(&self) -> Result<BackfillState, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        state: &BackfillState,
    ) -> Result<bool, StoreError> {
        let mut stored = self.state.lock().await;
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = state.clone();
        stored.version = expected_version + 1;
        Ok(true)
    }

    async fn append_packages(
        &self,
        start_position: u64,
        names: &[String],
    ) -> Result<(), StoreError> {
        let mut packages = self.packages.lock().await;
        // Positions are sequential; re-appended crash-recovery batches
        // overlap the tail and are dropped, like the position conflict in
        // the database store.
        if (start_position as usize) < packages.len() {
            return Ok(());
        }
        packages.extend(names.iter().cloned());
        Ok(())
    }

    async fn package_slice(&self, offset: u64, limit: u64) -> Result<Vec<String>, StoreError> {
        let packages = self.packages.lock().await;
        Ok(packages
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn clear_packages(&self) -> Result<(), StoreError> {
        self.packages.lock().await.clear();
        Ok(())
    }
}

/// The backfill state machine.
pub struct BackfillOrchestrator<S: BackfillStateStore> {
    store: S,
    queue: Arc<dyn JobQueue>,
    client: Arc<RegistryClient>,
    batch_size: u64,
    page_size: usize,
    tick_interval: Duration,
    tick_guard: Mutex<()>,
    on_progress: Option<ProgressCallback>,
}

impl<S: BackfillStateStore> BackfillOrchestrator<S> {
    pub fn new(store: S, queue: Arc<dyn JobQueue>, client: Arc<RegistryClient>) -> Self {
        Self {
            store,
            queue,
            client,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: crate::registry::DEFAULT_PAGE_SIZE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            tick_guard: Mutex::new(()),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Current state, for status reporting.
    pub async fn status(&self) -> Result<BackfillState, BackfillError> {
        Ok(self.store.load().await?)
    }

    /// Start the backfill. Rejected synchronously when already running;
    /// terminal states require an explicit reset first.
    pub async fn start(&self) -> Result<(), BackfillError> {
        let mut state = self.store.load().await?;

        match state.status {
            BackfillStatus::Running => return Err(BackfillError::AlreadyRunning),
            BackfillStatus::Idle => {}
            from => {
                return Err(BackfillError::InvalidTransition {
                    from,
                    to: BackfillStatus::Running,
                });
            }
        }

        state.status = BackfillStatus::Running;
        state.total = 0;
        state.offset = 0;
        state.rate = 0.0;
        state.started_at = Some(Utc::now());
        state.error_message = None;
        self.write(state).await?;

        self.enqueue_tick(None).await?;
        tracing::info!("Backfill started");
        Ok(())
    }

    /// Pause a running backfill. Progress counters are preserved.
    pub async fn pause(&self) -> Result<(), BackfillError> {
        let mut state = self.store.load().await?;
        self.ensure_transition(&state, BackfillStatus::Paused)?;

        state.status = BackfillStatus::Paused;
        self.write(state).await?;
        tracing::info!("Backfill paused");
        Ok(())
    }

    /// Resume a paused backfill from the preserved offset.
    pub async fn resume(&self) -> Result<(), BackfillError> {
        let mut state = self.store.load().await?;
        self.ensure_transition(&state, BackfillStatus::Running)?;

        state.status = BackfillStatus::Running;
        self.write(state).await?;

        self.enqueue_tick(None).await?;
        tracing::info!("Backfill resumed");
        Ok(())
    }

    /// Reset to idle from any state. Clears counters, the retained error,
    /// the stored universe and all pending ticks.
    pub async fn reset(&self) -> Result<(), BackfillError> {
        let state = self.store.load().await?;

        let mut fresh = BackfillState::initial();
        fresh.version = state.version;
        self.write(fresh).await?;

        self.queue.clear_pending(JobKind::BackfillTick).await?;
        self.store.clear_packages().await?;
        tracing::info!("Backfill reset to idle");
        Ok(())
    }

    /// Crash recovery: when the state says running but no tick is pending,
    /// schedule one immediately. Returns whether a tick was scheduled.
    pub async fn recover_on_startup(&self) -> Result<bool, BackfillError> {
        let state = self.store.load().await?;
        if state.status != BackfillStatus::Running {
            return Ok(false);
        }

        if self.queue.pending_count(JobKind::BackfillTick).await? > 0 {
            return Ok(false);
        }

        self.enqueue_tick(None).await?;
        tracing::info!(
            offset = state.offset,
            total = state.total,
            "Backfill resumed after restart"
        );
        Ok(true)
    }

    /// One bounded step of the backfill.
    ///
    /// Single-flight: a tick arriving while another is in flight is
    /// skipped. A cold-start tick (no listing yet) drives the full listing
    /// and completes in one call; a drain tick enqueues the next batch
    /// from the stored universe and reschedules itself.
    pub async fn tick(&self) -> Result<TickOutcome, BackfillError> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::warn!("Backfill tick already in flight, skipping");
            return Ok(TickOutcome::Skipped);
        };

        let state = self.store.load().await?;
        if state.status != BackfillStatus::Running {
            return Ok(TickOutcome::Noop);
        }

        let result = if state.total == 0 {
            self.cold_start_tick(state).await
        } else {
            self.drain_tick(state).await
        };

        match &result {
            Ok(TickOutcome::Advanced { .. }) => {
                self.schedule_next_tick().await;
            }
            Err(BackfillError::Listing(_)) => {
                // Status is now `error`; the supervisor restarts after an
                // operator reset, not this loop.
            }
            Err(err) => {
                // Self-healing: the failure is logged, state is intact,
                // and the next tick takes another swing.
                tracing::error!(error = %err, "Backfill tick failed, next tick scheduled");
                self.schedule_next_tick().await;
            }
            Ok(_) => {}
        }

        result
    }

    /// Cold start: no listing has happened yet. Pull the whole listing,
    /// storing and enqueuing each batch as it arrives.
    async fn cold_start_tick(
        &self,
        mut state: BackfillState,
    ) -> Result<TickOutcome, BackfillError> {
        let mut listing =
            PackageListing::with_page_size((*self.client).clone(), self.page_size);
        emit(self.on_progress.as_ref(), SyncProgress::ListingStarted);

        loop {
            match listing.next_batch().await {
                Ok(Some(batch)) => {
                    let start_position = state.offset as u64;
                    self.store
                        .append_packages(start_position, &batch.names)
                        .await?;
                    self.enqueue_package_syncs(&batch.names).await?;

                    state.offset = batch.cumulative as i64;
                    state.total = (batch.estimated_total.max(batch.cumulative)) as i64;
                    state.rate = compute_rate(&state);
                    state = self.write(state).await?;

                    emit(
                        self.on_progress.as_ref(),
                        SyncProgress::ListedBatch {
                            count: batch.names.len(),
                            cumulative: batch.cumulative,
                            estimated_total: batch.estimated_total,
                        },
                    );
                }
                Ok(None) => break,
                Err(err) => {
                    state.status = BackfillStatus::Error;
                    state.error_message = Some(err.to_string());
                    if let Err(write_err) = self.write(state).await {
                        tracing::error!(error = %write_err, "Failed to record backfill error state");
                    }
                    return Err(err.into());
                }
            }
        }

        // The estimate included internal rows; the enqueued count is the
        // real total.
        state.total = state.offset;
        state.status = BackfillStatus::Completed;
        state.rate = compute_rate(&state);
        let total = state.total as u64;
        self.write(state).await?;

        emit(
            self.on_progress.as_ref(),
            SyncProgress::BackfillCompleted { total },
        );
        tracing::info!(total, "Backfill listing complete in a single tick");
        Ok(TickOutcome::Completed { total })
    }

    /// Drain the next batch from the stored universe.
    async fn drain_tick(&self, mut state: BackfillState) -> Result<TickOutcome, BackfillError> {
        let names = self
            .store
            .package_slice(state.offset as u64, self.batch_size)
            .await?;

        if names.is_empty() {
            state.total = state.offset;
            state.status = BackfillStatus::Completed;
            let total = state.total as u64;
            self.write(state).await?;
            emit(
                self.on_progress.as_ref(),
                SyncProgress::BackfillCompleted { total },
            );
            tracing::info!(total, "Backfill completed");
            return Ok(TickOutcome::Completed { total });
        }

        self.enqueue_package_syncs(&names).await?;

        state.offset += names.len() as i64;
        if state.offset > state.total {
            state.total = state.offset;
        }
        state.rate = compute_rate(&state);

        let offset = state.offset as u64;
        let total = state.total as u64;
        let rate = state.rate;
        let eta = state.eta_seconds();

        if state.offset >= state.total {
            state.status = BackfillStatus::Completed;
            self.write(state).await?;
            emit(
                self.on_progress.as_ref(),
                SyncProgress::BackfillCompleted { total },
            );
            tracing::info!(total, "Backfill completed");
            return Ok(TickOutcome::Completed { total });
        }

        self.write(state).await?;

        emit(
            self.on_progress.as_ref(),
            SyncProgress::TickAdvanced {
                offset,
                total,
                rate,
                eta_seconds: eta,
            },
        );
        tracing::info!(
            offset,
            total,
            eta_seconds = eta.map(|e| e.round()),
            "Backfill progress"
        );

        Ok(TickOutcome::Advanced { offset, total })
    }

    fn ensure_transition(
        &self,
        state: &BackfillState,
        to: BackfillStatus,
    ) -> Result<(), BackfillError> {
        if state.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(BackfillError::InvalidTransition {
                from: state.status,
                to,
            })
        }
    }

    /// CAS-write a state, returning it with the bumped version.
    async fn write(&self, mut state: BackfillState) -> Result<BackfillState, BackfillError> {
        let expected = state.version;
        if !self.store.compare_and_swap(expected, &state).await? {
            return Err(BackfillError::Conflict);
        }
        state.version = expected + 1;
        Ok(state)
    }

    async fn enqueue_package_syncs(&self, names: &[String]) -> Result<(), BackfillError> {
        for name in names {
            self.queue
                .enqueue(
                    JobPayload::PackageSync {
                        name: name.clone(),
                        seq: None,
                        deleted: false,
                    },
                    JobOptions::default(),
                )
                .await?;
        }
        Ok(())
    }

    async fn enqueue_tick(&self, delay: Option<Duration>) -> Result<bool, BackfillError> {
        let mut options = JobOptions::default().with_attempts(1);
        if let Some(delay) = delay {
            options = options.with_delay(delay);
        }
        Ok(self.queue.enqueue(JobPayload::BackfillTick, options).await?)
    }

    async fn schedule_next_tick(&self) {
        if let Err(err) = self.enqueue_tick(Some(self.tick_interval)).await {
            tracing::error!(error = %err, "Failed to schedule next backfill tick");
        }
    }
}

fn compute_rate(state: &BackfillState) -> f64 {
    let Some(started_at) = state.started_at else {
        return 0.0;
    };
    let elapsed = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;
    if elapsed > 0.0 {
        state.offset as f64 / elapsed
    } else {
        0.0
    }
}
