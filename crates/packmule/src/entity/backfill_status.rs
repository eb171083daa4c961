//! Status enum for the backfill state machine.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the full-registry backfill.
///
/// Transitions are strictly sequential: `idle → running → {paused,
/// completed, error}`, `paused → running`, and `completed`/`error` return
/// to `idle` only via an explicit reset.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum BackfillStatus {
    #[sea_orm(string_value = "idle")]
    #[default]
    Idle,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "error")]
    Error,
}

impl std::fmt::Display for BackfillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackfillStatus::Idle => write!(f, "idle"),
            BackfillStatus::Running => write!(f, "running"),
            BackfillStatus::Paused => write!(f, "paused"),
            BackfillStatus::Completed => write!(f, "completed"),
            BackfillStatus::Error => write!(f, "error"),
        }
    }
}

impl BackfillStatus {
    /// Whether the state machine permits a direct transition.
    ///
    /// Reset-to-idle is handled separately by the orchestrator's `reset`
    /// operation and is permitted from any state.
    #[must_use]
    pub fn can_transition_to(self, next: BackfillStatus) -> bool {
        use BackfillStatus::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Error)
                | (Paused, Running)
        )
    }
}
