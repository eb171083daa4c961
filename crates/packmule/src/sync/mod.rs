//! The registry sync pipeline.
//!
//! # Module structure
//!
//! - [`job`] - typed queue payloads and per-job options
//! - [`queue`] - the durable-queue boundary and the in-process queue
//! - [`consumer`] - per-package fetch/enrich/upsert
//! - [`backfill`] - the cold-start orchestrator state machine
//! - [`worker`] - the job router at the consumer boundary
//! - [`progress`] - progress events for CLI and logging consumers
//!
//! Data flow: change feed / backfill lister → sync queue → per-package
//! enrichment → search-index upsert → notification dispatch → channel
//! delivery queues. Components coordinate only through the queue and the
//! database; there is no shared in-process mutable state between them.

pub mod backfill;
pub mod consumer;
pub mod job;
pub mod progress;
pub mod queue;
pub mod worker;

pub use backfill::{
    BackfillError, BackfillOrchestrator, BackfillStateStore, DEFAULT_BATCH_SIZE,
    DEFAULT_TICK_INTERVAL, DbStateStore, MemoryStateStore, TickOutcome,
};
pub use consumer::{SyncHandler, SyncOutcome, enrich};
pub use job::{JobKind, JobOptions, JobPayload};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use queue::{JobError, JobHandler, JobQueue, MemoryQueue, QueueError};
pub use worker::PipelineHandler;
