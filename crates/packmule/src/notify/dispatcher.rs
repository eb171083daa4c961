//! Notification dispatch: fan out one package update to every favoriting
//! user that wants to hear about it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use uuid::Uuid;

use crate::entity::notification::ActiveModel as NotificationActiveModel;
use crate::queries;
use crate::sync::{JobOptions, JobPayload, JobQueue};

use super::preferences::Preferences;
use super::severity::classify_update;
use super::types::{DispatchResult, Severity, UpdateEnrichment};

/// Attempts granted to channel delivery jobs.
const DELIVERY_ATTEMPTS: u32 = 5;

/// Fan-out dispatcher over the favorites tables and the delivery queues.
pub struct Dispatcher {
    db: DatabaseConnection,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(db: DatabaseConnection, queue: Arc<dyn JobQueue>) -> Self {
        Self { db, queue }
    }

    /// Dispatch one observed version transition.
    ///
    /// Never fails the caller: database unavailability degrades the whole
    /// dispatch to a no-op result, and per-user channel failures are
    /// logged and skipped. Re-dispatching the same `(package, version)` is
    /// idempotent end to end — the notification row conflict-ignores and
    /// the delivery job ids dedup.
    pub async fn dispatch(
        &self,
        package: &str,
        enrichment: &UpdateEnrichment,
        previous_version: Option<&str>,
        new_version: &str,
    ) -> DispatchResult {
        let subscribers = match queries::favorites::subscribers_for_package(&self.db, package).await
        {
            Ok(subscribers) => subscribers,
            Err(err) => {
                // Sync must not block on notification infrastructure.
                tracing::warn!(
                    package,
                    error = %err,
                    "Favorites lookup failed, skipping dispatch"
                );
                return DispatchResult::default();
            }
        };

        let severity = classify_update(previous_version, new_version, enrichment);
        let mut result = DispatchResult::default();

        for subscriber in subscribers {
            let prefs = Preferences::from_model(subscriber.preferences.as_ref());

            if !prefs.should_notify(severity, enrichment.is_security_update) {
                result.skipped += 1;
                continue;
            }
            result.notified += 1;

            if prefs.in_app_enabled {
                self.insert_notification(
                    subscriber.user_id,
                    package,
                    enrichment,
                    previous_version,
                    new_version,
                    severity,
                )
                .await;
            }

            if let Some(chat) = &subscriber.chat
                && chat.enabled
            {
                self.enqueue_delivery(
                    JobPayload::ChatDelivery {
                        user_id: subscriber.user_id,
                        package_name: package.to_string(),
                        new_version: new_version.to_string(),
                        severity,
                    },
                    Some(format!("chat:{}", subscriber.user_id)),
                )
                .await;
            }

            if prefs.email_immediate_critical && severity == Severity::Critical {
                self.enqueue_delivery(
                    JobPayload::EmailDelivery {
                        user_id: subscriber.user_id,
                        package_name: package.to_string(),
                        new_version: new_version.to_string(),
                        severity,
                    },
                    None,
                )
                .await;
            }
        }

        tracing::debug!(
            package,
            new_version,
            severity = %severity,
            notified = result.notified,
            skipped = result.skipped,
            "Dispatch complete"
        );

        result
    }

    async fn insert_notification(
        &self,
        user_id: Uuid,
        package: &str,
        enrichment: &UpdateEnrichment,
        previous_version: Option<&str>,
        new_version: &str,
        severity: Severity,
    ) {
        let model = NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            package_name: Set(package.to_string()),
            new_version: Set(new_version.to_string()),
            previous_version: Set(previous_version.map(str::to_string)),
            severity: Set(severity),
            is_security_update: Set(enrichment.is_security_update),
            is_breaking_change: Set(enrichment.is_breaking_change),
            changelog_snippet: Set(enrichment.changelog_snippet.clone()),
            vulnerabilities_fixed: Set(serde_json::json!(enrichment.vulnerabilities_fixed)),
            read: Set(false),
            created_at: Set(Utc::now()),
        };

        match queries::notifications::insert_if_absent(&self.db, model).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    %user_id,
                    package,
                    new_version,
                    "Notification already recorded, re-dispatch absorbed"
                );
            }
            Err(err) => {
                tracing::warn!(%user_id, package, error = %err, "Notification insert failed");
            }
        }
    }

    async fn enqueue_delivery(&self, payload: JobPayload, rate_limit_key: Option<String>) {
        let mut options = JobOptions::default()
            .with_attempts(DELIVERY_ATTEMPTS);
        options.backoff_initial = Duration::from_secs(1);
        if let Some(key) = rate_limit_key {
            options = options.with_rate_limit_key(key);
        }

        let job_id = payload.default_job_id();
        if let Err(err) = self.queue.enqueue(payload, options).await {
            tracing::warn!(job_id = %job_id, error = %err, "Delivery enqueue failed");
        }
    }
}
