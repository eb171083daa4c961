//! Channel delivery workers for chat and email jobs.
//!
//! Template rendering and the mail pipeline are collaborators; the workers
//! here own retry classification and the webhook POST, nothing more.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::entity::chat_integration::Entity as ChatIntegration;
use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::sync::JobError;

use super::types::Severity;

/// Outbound email boundary. The real sender lives outside this crate;
/// [`LogEmailSender`] stands in for local runs and tests.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_immediate(
        &self,
        user_id: Uuid,
        package: &str,
        new_version: &str,
        severity: Severity,
    ) -> Result<(), String>;
}

/// Email sender that only records the send in the log stream.
#[derive(Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_immediate(
        &self,
        user_id: Uuid,
        package: &str,
        new_version: &str,
        severity: Severity,
    ) -> Result<(), String> {
        tracing::info!(
            %user_id,
            package,
            new_version,
            severity = %severity,
            "Immediate email delivery (log sender)"
        );
        Ok(())
    }
}

/// Executes chat and email delivery jobs.
pub struct DeliveryWorker {
    db: DatabaseConnection,
    transport: Arc<dyn HttpTransport>,
    email: Arc<dyn EmailSender>,
}

impl DeliveryWorker {
    pub fn new(
        db: DatabaseConnection,
        transport: Arc<dyn HttpTransport>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            db,
            transport,
            email,
        }
    }

    /// Deliver one chat message through the user's webhook.
    ///
    /// A missing or disabled integration is a no-op: the user disconnected
    /// between enqueue and delivery.
    pub async fn deliver_chat(
        &self,
        user_id: Uuid,
        package: &str,
        new_version: &str,
        severity: Severity,
    ) -> Result<(), JobError> {
        let integration = ChatIntegration::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(|e| JobError::Retryable(format!("integration lookup: {e}")))?;

        let Some(integration) = integration else {
            tracing::debug!(%user_id, package, "Chat integration gone, dropping delivery");
            return Ok(());
        };
        if !integration.enabled {
            tracing::debug!(%user_id, package, "Chat integration disabled, dropping delivery");
            return Ok(());
        }

        let body = serde_json::json!({
            "text": format!("{package} {new_version} released ({severity})"),
            "package": package,
            "version": new_version,
            "severity": severity,
        });

        let response = self
            .transport
            .send(HttpRequest {
                method: HttpMethod::Post,
                url: integration.webhook_url.clone(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )],
                body: body.to_string().into_bytes(),
            })
            .await
            .map_err(|e| JobError::Retryable(format!("webhook send: {e}")))?;

        match response.status {
            status if (200..300).contains(&status) => Ok(()),
            status if status == 429 || status >= 500 => Err(JobError::Retryable(format!(
                "webhook returned {status}"
            ))),
            status => Err(JobError::Fatal(format!("webhook returned {status}"))),
        }
    }

    /// Deliver one immediate email through the sender boundary.
    pub async fn deliver_email(
        &self,
        user_id: Uuid,
        package: &str,
        new_version: &str,
        severity: Severity,
    ) -> Result<(), JobError> {
        self.email
            .send_immediate(user_id, package, new_version, severity)
            .await
            .map_err(JobError::Retryable)
    }
}
