use std::sync::Mutex;

use async_trait::async_trait;

use crate::dispatch::{DeliveryError, DeliveryReceipt, EmailDelivery, InviteMessage};

/// Mail collaborator that accepts every message and keeps a copy.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<InviteMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<InviteMessage> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn last_message(&self) -> Option<InviteMessage> {
        self.sent.lock().ok().and_then(|g| g.last().cloned())
    }
}

#[async_trait]
impl EmailDelivery for RecordingMailer {
    async fn deliver(&self, message: &InviteMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| DeliveryError::Unavailable("recording mailer lock poisoned".into()))?;
        guard.push(message.clone());
        Ok(DeliveryReceipt {
            message_id: Some(format!("recorded-{}", guard.len())),
        })
    }
}

/// Mail collaborator whose every delivery fails.
#[derive(Debug, Clone)]
pub struct FailingMailer {
    reason: String,
}

impl FailingMailer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for FailingMailer {
    fn default() -> Self {
        Self::new("connection refused")
    }
}

#[async_trait]
impl EmailDelivery for FailingMailer {
    async fn deliver(&self, _message: &InviteMessage) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::Unavailable(self.reason.clone()))
    }
}
