//! Invitation delivery adapters

use crate::config::MailerConfig;
use crate::error::{DaemonError, DaemonResult};
use async_trait::async_trait;
use cosign_engine::{DeliveryError, DeliveryReceipt, EmailDelivery, InviteMessage};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured mailer.
pub fn build_mailer(config: &MailerConfig) -> DaemonResult<Arc<dyn EmailDelivery>> {
    let mailer: Arc<dyn EmailDelivery> = match config {
        MailerConfig::Log => Arc::new(LogMailer),
        MailerConfig::Webhook { url, timeout_secs } => Arc::new(WebhookMailer::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    };
    Ok(mailer)
}

/// Writes the invitation to the log and reports it delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl EmailDelivery for LogMailer {
    async fn deliver(&self, message: &InviteMessage) -> Result<DeliveryReceipt, DeliveryError> {
        tracing::info!(
            participant_id = %message.participant_id,
            contract_number = %message.contract_number,
            recipient = %message.recipient_email,
            "Invitation ready (log mailer, not sent)"
        );
        Ok(DeliveryReceipt::default())
    }
}

/// POSTs each invitation as JSON to an external mail service.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    message_id: Option<String>,
}

impl WebhookMailer {
    pub fn new(url: String, timeout: Duration) -> DaemonResult<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DaemonError::Config(format!(
                "mailer webhook url must be http(s): {}",
                url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DaemonError::Config(format!("mailer client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EmailDelivery for WebhookMailer {
    async fn deliver(&self, message: &InviteMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DeliveryError::Unavailable(format!(
                "mail service returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected(format!("{}: {}", status, detail)));
        }

        // An empty or non-JSON body still counts as accepted.
        let reply = response.json::<WebhookReply>().await.unwrap_or_default();
        tracing::debug!(
            participant_id = %message.participant_id,
            message_id = ?reply.message_id,
            "Invitation accepted by mail service"
        );
        Ok(DeliveryReceipt {
            message_id: reply.message_id,
        })
    }
}
