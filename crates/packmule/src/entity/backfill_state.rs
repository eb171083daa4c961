//! BackfillState entity - the single persisted row driving the cold-start
//! full-registry sync.
//!
//! Exactly one row exists (fixed id), created lazily on first load and
//! reset only by explicit operator action. Every mutation goes through a
//! compare-and-swap on `version`, so concurrent writers lose cleanly
//! instead of clobbering each other.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::backfill_status::BackfillStatus;

/// The fixed primary key of the singleton row.
pub const SINGLETON_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backfill_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    /// Current state-machine status.
    pub status: BackfillStatus,

    /// Total package names discovered by the listing (0 until listed).
    pub total: i64,

    /// Names enqueued so far. Invariant: `offset <= total` while running.
    pub offset: i64,

    /// When the current run started.
    pub started_at: Option<DateTimeUtc>,

    /// Enqueue throughput in packages/second, recomputed per tick.
    pub rate: f64,

    /// Retained after a failure until an explicit reset.
    pub error_message: Option<String>,

    /// Optimistic-concurrency token, bumped on every write.
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The pristine singleton row.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            id: SINGLETON_ID,
            status: BackfillStatus::Idle,
            total: 0,
            offset: 0,
            started_at: None,
            rate: 0.0,
            error_message: None,
            version: 0,
        }
    }

    /// Remaining-work estimate in seconds, when the rate is meaningful.
    #[must_use]
    pub fn eta_seconds(&self) -> Option<f64> {
        if self.status == BackfillStatus::Running && self.rate > 0.0 && self.total > self.offset {
            Some((self.total - self.offset) as f64 / self.rate)
        } else {
            None
        }
    }
}
