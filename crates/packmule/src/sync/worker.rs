//! The consumer boundary: one handler routing every job kind.

use std::sync::Arc;

use async_trait::async_trait;

use crate::notify::DeliveryWorker;

use super::backfill::{BackfillError, BackfillOrchestrator, BackfillStateStore};
use super::consumer::SyncHandler;
use super::job::JobPayload;
use super::queue::{JobError, JobHandler};

/// Routes queue payloads to the sync handler, the backfill orchestrator
/// and the delivery workers. The match is exhaustive: a new job kind does
/// not compile until it is handled here.
pub struct PipelineHandler<S: BackfillStateStore> {
    sync: SyncHandler,
    backfill: Option<Arc<BackfillOrchestrator<S>>>,
    delivery: Option<Arc<DeliveryWorker>>,
}

impl<S: BackfillStateStore> PipelineHandler<S> {
    pub fn new(sync: SyncHandler) -> Self {
        Self {
            sync,
            backfill: None,
            delivery: None,
        }
    }

    #[must_use]
    pub fn with_backfill(mut self, backfill: Arc<BackfillOrchestrator<S>>) -> Self {
        self.backfill = Some(backfill);
        self
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<DeliveryWorker>) -> Self {
        self.delivery = Some(delivery);
        self
    }
}

#[async_trait]
impl<S: BackfillStateStore + 'static> JobHandler for PipelineHandler<S> {
    async fn handle(&self, payload: JobPayload) -> Result<(), JobError> {
        match payload {
            JobPayload::PackageSync { name, deleted, .. } => {
                self.sync.sync_package(&name, deleted).await.map(|_| ())
            }

            JobPayload::BackfillTick => {
                let Some(orchestrator) = &self.backfill else {
                    return Err(JobError::Fatal(
                        "backfill tick received but no orchestrator configured".to_string(),
                    ));
                };
                // The orchestrator owns tick failure policy (it logs,
                // records error state, and self-schedules); the queue must
                // not add its own retries on top.
                match orchestrator.tick().await {
                    Ok(_) => Ok(()),
                    Err(BackfillError::Listing(_)) => Ok(()),
                    Err(err) => {
                        tracing::debug!(error = %err, "Tick error handled by orchestrator");
                        Ok(())
                    }
                }
            }

            JobPayload::ChatDelivery {
                user_id,
                package_name,
                new_version,
                severity,
            } => {
                let Some(delivery) = &self.delivery else {
                    return Err(JobError::Fatal(
                        "chat delivery received but no delivery worker configured".to_string(),
                    ));
                };
                delivery
                    .deliver_chat(user_id, &package_name, &new_version, severity)
                    .await
            }

            JobPayload::EmailDelivery {
                user_id,
                package_name,
                new_version,
                severity,
            } => {
                let Some(delivery) = &self.delivery else {
                    return Err(JobError::Fatal(
                        "email delivery received but no delivery worker configured".to_string(),
                    ));
                };
                delivery
                    .deliver_email(user_id, &package_name, &new_version, severity)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::severity::Severity;
    use crate::http::{HttpMethod, MockTransport};
    use crate::index::MemoryIndex;
    use crate::registry::RegistryClient;
    use crate::retry::RetryConfig;
    use crate::sync::backfill::MemoryStateStore;
    use crate::sync::queue::{JobQueue, MemoryQueue};
    use std::time::Duration;
    use uuid::Uuid;

    fn pipeline(transport: &MockTransport) -> PipelineHandler<MemoryStateStore> {
        let client = Arc::new(RegistryClient::new(
            Arc::new(transport.clone()),
            "https://reg.test",
        ));
        let sync = SyncHandler::new(client, Arc::new(MemoryIndex::new()))
            .with_retry(RetryConfig::new(Duration::ZERO, Duration::ZERO, 0));
        PipelineHandler::new(sync)
    }

    #[tokio::test]
    async fn package_sync_jobs_flow_to_the_sync_handler() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            "https://reg.test/left-pad",
            &serde_json::json!({
                "name": "left-pad",
                "dist-tags": { "latest": "1.3.0" },
                "versions": { "1.3.0": { "version": "1.3.0" } }
            }),
        );

        pipeline(&transport)
            .handle(JobPayload::PackageSync {
                name: "left-pad".to_string(),
                seq: Some(7),
                deleted: false,
            })
            .await
            .expect("sync job should succeed");
    }

    #[tokio::test]
    async fn unconfigured_stages_fail_fatally() {
        let transport = MockTransport::new();
        let handler = pipeline(&transport);

        let err = handler
            .handle(JobPayload::BackfillTick)
            .await
            .expect_err("no orchestrator");
        assert!(matches!(err, JobError::Fatal(_)));

        let err = handler
            .handle(JobPayload::ChatDelivery {
                user_id: Uuid::new_v4(),
                package_name: "x".to_string(),
                new_version: "1.0.0".to_string(),
                severity: Severity::Info,
            })
            .await
            .expect_err("no delivery worker");
        assert!(matches!(err, JobError::Fatal(_)));
    }

    #[tokio::test]
    async fn backfill_tick_jobs_drive_the_orchestrator() {
        let transport = MockTransport::new();
        let queue = Arc::new(MemoryQueue::new());
        let client = Arc::new(RegistryClient::new(
            Arc::new(transport.clone()),
            "https://reg.test",
        ));
        let orchestrator = Arc::new(BackfillOrchestrator::new(
            MemoryStateStore::new(),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            client,
        ));

        let handler = pipeline(&transport).with_backfill(Arc::clone(&orchestrator));

        // Idle orchestrator: the tick is a no-op, and a no-op is success.
        handler
            .handle(JobPayload::BackfillTick)
            .await
            .expect("noop tick");
    }
}
