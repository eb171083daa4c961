//! Queue job payloads and options.
//!
//! Every job on the wire is one variant of [`JobPayload`] — a tagged enum
//! rather than loose JSON, so consumers match exhaustively and an unknown
//! payload is a deserialization error at the boundary, not a runtime
//! surprise deep in a handler.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::severity::Severity;

/// A queue job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Sync one package into the search index. Idempotency key = name.
    PackageSync {
        name: String,
        /// Change-feed sequence that produced this job, when applicable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default)]
        deleted: bool,
    },

    /// One bounded step of the backfill orchestrator.
    BackfillTick,

    /// Deliver a chat message about a package update.
    ChatDelivery {
        user_id: Uuid,
        package_name: String,
        new_version: String,
        severity: Severity,
    },

    /// Deliver an immediate email about a critical package update.
    EmailDelivery {
        user_id: Uuid,
        package_name: String,
        new_version: String,
        severity: Severity,
    },
}

/// Job kind discriminant, used for pending-count and clear operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    PackageSync,
    BackfillTick,
    ChatDelivery,
    EmailDelivery,
}

impl JobPayload {
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::PackageSync { .. } => JobKind::PackageSync,
            JobPayload::BackfillTick => JobKind::BackfillTick,
            JobPayload::ChatDelivery { .. } => JobKind::ChatDelivery,
            JobPayload::EmailDelivery { .. } => JobKind::EmailDelivery,
        }
    }

    /// The idempotency key for this payload.
    ///
    /// Re-enqueuing a payload with the same job id while one is pending is
    /// deduplicated by the queue; channel deliveries key on
    /// `(user, package, version)` so retries cannot double-send.
    #[must_use]
    pub fn default_job_id(&self) -> String {
        match self {
            JobPayload::PackageSync { name, .. } => format!("sync:{name}"),
            JobPayload::BackfillTick => "backfill:tick".to_string(),
            JobPayload::ChatDelivery {
                user_id,
                package_name,
                new_version,
                ..
            } => format!("chat:{user_id}:{package_name}:{new_version}"),
            JobPayload::EmailDelivery {
                user_id,
                package_name,
                new_version,
                ..
            } => format!("email:{user_id}:{package_name}:{new_version}"),
        }
    }
}

/// Per-job queue options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Dedup key; defaults to [`JobPayload::default_job_id`].
    pub job_id: Option<String>,
    /// Earliest the job becomes ready.
    pub delay: Option<Duration>,
    /// Total attempts (first run included).
    pub attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub backoff_initial: Duration,
    /// Rate-limit bucket this job draws from, if any.
    pub rate_limit_key: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            delay: None,
            attempts: 3,
            backoff_initial: Duration::from_secs(1),
            rate_limit_key: None,
        }
    }
}

impl JobOptions {
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_sync_round_trips_through_json() {
        let payload = JobPayload::PackageSync {
            name: "left-pad".to_string(),
            seq: Some(42),
            deleted: false,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"package_sync\""));

        let parsed: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn unknown_payloads_fail_at_the_boundary() {
        let result = serde_json::from_str::<JobPayload>(r#"{"type": "mystery_job"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn job_ids_carry_the_idempotency_key() {
        let sync = JobPayload::PackageSync {
            name: "left-pad".to_string(),
            seq: None,
            deleted: false,
        };
        assert_eq!(sync.default_job_id(), "sync:left-pad");

        assert_eq!(JobPayload::BackfillTick.default_job_id(), "backfill:tick");

        let user_id = Uuid::nil();
        let chat = JobPayload::ChatDelivery {
            user_id,
            package_name: "left-pad".to_string(),
            new_version: "2.0.0".to_string(),
            severity: Severity::Important,
        };
        assert_eq!(
            chat.default_job_id(),
            format!("chat:{user_id}:left-pad:2.0.0")
        );
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(JobPayload::BackfillTick.kind(), JobKind::BackfillTick);
        let sync = JobPayload::PackageSync {
            name: "x".to_string(),
            seq: None,
            deleted: true,
        };
        assert_eq!(sync.kind(), JobKind::PackageSync);
    }

    #[test]
    fn options_builders_clamp_attempts() {
        let options = JobOptions::default().with_attempts(0);
        assert_eq!(options.attempts, 1);

        let options = JobOptions::default()
            .with_delay(Duration::from_secs(5))
            .with_rate_limit_key("chat:user");
        assert_eq!(options.delay, Some(Duration::from_secs(5)));
        assert_eq!(options.rate_limit_key.as_deref(), Some("chat:user"));
    }
}
