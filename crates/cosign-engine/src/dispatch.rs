//! Invitation Dispatcher.
//!
//! Binds a fresh token to a participant, marks them `sent`, then hands the
//! signing link to the mail collaborator. The status write happens first and
//! the mail call happens after it with nothing held; a failed delivery moves
//! the participant to `send_failed` instead of leaving them looking invited.

use crate::aggregator::CompletionAggregator;
use crate::context::SigningContext;
use crate::error::{SigningError, SigningResult};
use crate::link::SigningLink;
use crate::token::{install, token_payload, TokenIssuer};
use async_trait::async_trait;
use cosign_storage::{
    ParticipantFence, ParticipantStore, SigningEvent, SigningEventKind, StorageError,
};
use cosign_types::{
    ContractId, ContractRecord, ExecutionStatus, Participant, ParticipantId, ParticipantStatus,
    TokenGrant,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What the mail collaborator receives for one invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteMessage {
    pub recipient_email: String,
    pub recipient_name: String,
    pub signing_url: String,
    pub contract_number: String,
    pub contract_id: ContractId,
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider-side message id, when the provider returns one.
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("mail provider rejected the message: {0}")]
    Rejected(String),

    #[error("mail provider unavailable: {0}")]
    Unavailable(String),
}

/// Outbound email collaborator.
#[async_trait]
pub trait EmailDelivery: Send + Sync {
    async fn deliver(&self, message: &InviteMessage) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Result of a delivered invitation.
#[derive(Debug, Clone, Serialize)]
pub struct InviteOutcome {
    pub participant: Participant,
    pub grant: TokenGrant,
    pub signing_url: SigningLink,
    pub receipt: DeliveryReceipt,
}

#[derive(Clone)]
pub struct InvitationDispatcher {
    ctx: SigningContext,
    issuer: TokenIssuer,
    mailer: Arc<dyn EmailDelivery>,
    aggregator: CompletionAggregator,
}

impl InvitationDispatcher {
    pub fn new(
        ctx: SigningContext,
        issuer: TokenIssuer,
        mailer: Arc<dyn EmailDelivery>,
        aggregator: CompletionAggregator,
    ) -> Self {
        Self {
            ctx,
            issuer,
            mailer,
            aggregator,
        }
    }

    /// Send, or resend, the signing invitation for one participant.
    ///
    /// Every call mints a new token and invalidates the previous one. If the
    /// token write fails nothing is sent and the participant is unchanged.
    pub async fn send_invite(
        &self,
        participant_id: &ParticipantId,
        actor: &str,
    ) -> SigningResult<InviteOutcome> {
        let current = self.ctx.participant(participant_id).await?;
        let recipient_email = match current.signing_channel() {
            Some(email) => email.to_string(),
            None => {
                warn!(
                    participant_id = %participant_id,
                    "Cannot invite participant without an email address"
                );
                return Err(SigningError::MissingChannel(*participant_id));
            }
        };
        let contract = self.ctx.contract(&current.contract_id).await?;
        ensure_open(&contract)?;

        let credential = self.issuer.mint_for(&current)?;
        let now = credential.issued_at;
        let fence = ParticipantFence::of(&current);
        let resend = current.status.is_invited();
        let mut next = current;
        install(&mut next, &credential, now);
        next.status = ParticipantStatus::Sent;
        next.sent_at = Some(now);

        let sent = self
            .ctx
            .storage
            .replace_participant(fence, next)
            .await
            .map_err(|e| SigningError::from_participant_write(e, *participant_id))?;

        let mut payload = token_payload(&credential);
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("resend".to_string(), json!(resend));
        }
        self.ctx
            .record(
                SigningEvent::participant(&sent, SigningEventKind::InviteSent, actor, now)
                    .with_message(format!("invitation sent to {}", recipient_email))
                    .with_payload(payload),
            )
            .await;

        info!(
            contract_id = %sent.contract_id,
            participant_id = %participant_id,
            version = credential.version,
            resend,
            "Signing invitation prepared"
        );

        let signing_url = SigningLink::build(&self.ctx.config.signing_origin, &credential.token);
        let message = InviteMessage {
            recipient_email,
            recipient_name: sent.name.clone(),
            signing_url: signing_url.as_str().to_string(),
            contract_number: contract.contract_number.clone(),
            contract_id: contract.id,
            participant_id: sent.id,
        };
        let grant = TokenGrant::from_credential(sent.id, &credential);

        match self.mailer.deliver(&message).await {
            Ok(receipt) => {
                self.ctx
                    .record(
                        SigningEvent::participant(
                            &sent,
                            SigningEventKind::InviteDelivered,
                            actor,
                            self.ctx.now(),
                        )
                        .with_payload(json!({ "message_id": receipt.message_id })),
                    )
                    .await;
                self.aggregator.settle(&sent.contract_id, actor).await;

                Ok(InviteOutcome {
                    participant: sent,
                    grant,
                    signing_url,
                    receipt,
                })
            }
            Err(err) => {
                warn!(
                    participant_id = %participant_id,
                    error = %err,
                    "Signing invitation could not be delivered"
                );
                self.mark_send_failed(&sent, &err, actor).await?;
                self.aggregator.settle(&sent.contract_id, actor).await;

                Err(SigningError::DeliveryFailed {
                    participant_id: *participant_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Record a failed delivery. The status only moves if nothing touched the
    /// participant since the invitation was written; the credential stays so
    /// the link can still be shared by hand.
    async fn mark_send_failed(
        &self,
        sent: &Participant,
        err: &DeliveryError,
        actor: &str,
    ) -> SigningResult<()> {
        let now = self.ctx.now();
        let mut next = sent.clone();
        next.status = ParticipantStatus::SendFailed;
        next.updated_at = now;

        match self
            .ctx
            .storage
            .replace_participant(ParticipantFence::of(sent), next)
            .await
        {
            Ok(_) => {}
            Err(StorageError::Conflict(_)) | Err(StorageError::NotFound(_)) => {
                debug!(
                    participant_id = %sent.id,
                    "Participant moved on before the delivery failure was recorded"
                );
            }
            Err(other) => return Err(other.into()),
        }

        self.ctx
            .record(
                SigningEvent::participant(sent, SigningEventKind::DeliveryFailed, actor, now)
                    .with_message(err.to_string()),
            )
            .await;
        Ok(())
    }
}

fn ensure_open(contract: &ContractRecord) -> SigningResult<()> {
    if contract.voided || contract.execution_status == ExecutionStatus::Void {
        return Err(SigningError::InvalidState(format!(
            "contract {} has been voided; invitations can no longer be sent",
            contract.contract_number
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{context, seed_contract, seed_participant};
    use crate::mocks::{FailingMailer, RecordingMailer};
    use cosign_storage::ContractStore;
    use cosign_types::NewParticipant;

    fn dispatcher(ctx: &SigningContext, mailer: Arc<dyn EmailDelivery>) -> InvitationDispatcher {
        InvitationDispatcher::new(
            ctx.clone(),
            TokenIssuer::new(ctx.clone()),
            mailer,
            CompletionAggregator::new(ctx.clone()),
        )
    }

    #[tokio::test]
    async fn missing_email_fails_closed() {
        let (ctx, _clock) = context();
        let mailer = Arc::new(RecordingMailer::new());
        let contract = seed_contract(&ctx, "CTR-1").await;
        let p = seed_participant(&ctx, contract.id, NewParticipant::named("Jane Doe")).await;

        let err = dispatcher(&ctx, mailer.clone())
            .send_invite(&p.id, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::MissingChannel(id) if id == p.id));

        let stored = ctx.participant(&p.id).await.unwrap();
        assert_eq!(stored.status, ParticipantStatus::Pending);
        assert!(stored.credential.is_none());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn invite_marks_sent_and_mails_the_link() {
        let (ctx, _clock) = context();
        let mailer = Arc::new(RecordingMailer::new());
        let contract = seed_contract(&ctx, "CTR-2").await;
        let p = seed_participant(
            &ctx,
            contract.id,
            NewParticipant::named("Jane Doe").with_email("jane@example.com"),
        )
        .await;

        let outcome = dispatcher(&ctx, mailer.clone())
            .send_invite(&p.id, "admin")
            .await
            .unwrap();
        assert_eq!(outcome.participant.status, ParticipantStatus::Sent);
        assert!(outcome.participant.sent_at.is_some());

        let message = mailer.last_message().unwrap();
        assert_eq!(message.recipient_email, "jane@example.com");
        assert_eq!(message.contract_number, "CTR-2");
        assert_eq!(
            message.signing_url,
            format!(
                "https://app.example.com/sign-contract/{}",
                outcome.grant.token.as_str()
            )
        );
    }

    #[tokio::test]
    async fn resend_rotates_the_token() {
        let (ctx, _clock) = context();
        let mailer = Arc::new(RecordingMailer::new());
        let dispatcher = dispatcher(&ctx, mailer.clone());
        let contract = seed_contract(&ctx, "CTR-3").await;
        let p = seed_participant(
            &ctx,
            contract.id,
            NewParticipant::named("Witness").with_email("w@example.com"),
        )
        .await;

        let first = dispatcher.send_invite(&p.id, "admin").await.unwrap();
        let second = dispatcher.send_invite(&p.id, "admin").await.unwrap();
        assert_ne!(first.grant.token, second.grant.token);
        assert_eq!(second.grant.version, first.grant.version + 1);
        assert!(ctx
            .storage
            .find_by_token(&first.grant.token)
            .await
            .unwrap()
            .is_none());
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn delivery_failure_is_recorded_as_send_failed() {
        let (ctx, _clock) = context();
        let contract = seed_contract(&ctx, "CTR-4").await;
        let p = seed_participant(
            &ctx,
            contract.id,
            NewParticipant::named("Co-signer").with_email("c@example.com"),
        )
        .await;

        let err = dispatcher(&ctx, Arc::new(FailingMailer::default()))
            .send_invite(&p.id, "admin")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::DeliveryFailed { participant_id, .. } if participant_id == p.id
        ));

        let stored = ctx.participant(&p.id).await.unwrap();
        assert_eq!(stored.status, ParticipantStatus::SendFailed);
        assert!(stored.credential.is_some());
    }

    #[tokio::test]
    async fn void_contract_sends_nothing() {
        let (ctx, _clock) = context();
        let mailer = Arc::new(RecordingMailer::new());
        let contract = seed_contract(&ctx, "CTR-5").await;
        let p = seed_participant(
            &ctx,
            contract.id,
            NewParticipant::named("Late").with_email("late@example.com"),
        )
        .await;
        ctx.storage.mark_voided(&contract.id, ctx.now()).await.unwrap();

        let err = dispatcher(&ctx, mailer.clone())
            .send_invite(&p.id, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidState(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn executed_contract_still_accepts_invitations() {
        let (ctx, _clock) = context();
        let mailer = Arc::new(RecordingMailer::new());
        let contract = seed_contract(&ctx, "CTR-6").await;
        let p = seed_participant(
            &ctx,
            contract.id,
            NewParticipant::named("Observer").with_email("obs@example.com"),
        )
        .await;
        ctx.storage
            .transition_execution_status(
                &contract.id,
                ExecutionStatus::Draft,
                ExecutionStatus::Executed,
                ctx.now(),
            )
            .await
            .unwrap();

        let outcome = dispatcher(&ctx, mailer.clone())
            .send_invite(&p.id, "admin")
            .await
            .unwrap();
        assert_eq!(outcome.participant.status, ParticipantStatus::Sent);
        assert_eq!(mailer.sent().len(), 1);
    }
}
