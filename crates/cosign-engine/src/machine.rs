//! Participant State Machine.
//!
//! The signing surface drives `viewed`, `signed` and `declined` with nothing
//! but the token from the link. Each transition is one compare-and-set on the
//! participant's `(status, token_version)`: the token is checked against the
//! record that is about to be replaced, so two submissions of the same token
//! cannot both land. Terminal transitions retire the token for good.

use crate::aggregator::CompletionAggregator;
use crate::context::SigningContext;
use crate::error::{SigningError, SigningResult};
use crate::link::SigningLink;
use chrono::{DateTime, Utc};
use cosign_storage::{
    ParticipantFence, ParticipantStore, SigningEvent, SigningEventKind, StorageError,
};
use cosign_types::{
    ContractId, ContractRecord, DeclineRecord, Participant, ParticipantId, ParticipantStatus,
    SignatureRecord, SigningToken,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: usize = 3;
const LINK_ACTOR: &str = "signing-link";

/// Signature submitted from the signing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSubmission {
    /// Name typed by the signer.
    pub signed_by: String,
    /// Captured signature, e.g. a data URL of the drawn signature.
    pub signature_data: String,
}

impl SignatureSubmission {
    pub fn new(signed_by: impl Into<String>, signature_data: impl Into<String>) -> Self {
        Self {
            signed_by: signed_by.into(),
            signature_data: signature_data.into(),
        }
    }

    fn normalize(self) -> SigningResult<Self> {
        let signed_by = self.signed_by.trim().to_string();
        if signed_by.is_empty() {
            return Err(SigningError::InvalidInput(
                "signed_by must not be empty".to_string(),
            ));
        }
        if self.signature_data.trim().is_empty() {
            return Err(SigningError::InvalidInput(
                "signature_data must not be empty".to_string(),
            ));
        }
        Ok(Self {
            signed_by,
            signature_data: self.signature_data,
        })
    }
}

/// What a validated token grants access to.
#[derive(Debug, Clone, Serialize)]
pub struct SigningSession {
    pub participant: Participant,
    pub contract_id: ContractId,
    pub contract_number: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ParticipantStateMachine {
    ctx: SigningContext,
    aggregator: CompletionAggregator,
}

impl ParticipantStateMachine {
    pub fn new(ctx: SigningContext, aggregator: CompletionAggregator) -> Self {
        Self { ctx, aggregator }
    }

    /// Participant currently holding a live, unexpired `token`.
    ///
    /// A token retired by a signature or decline yields
    /// `TokenAlreadyConsumed`. Anything else that does not resolve, including
    /// a token superseded by a resend, yields `TokenExpired`.
    pub async fn resolve(&self, token: &SigningToken) -> SigningResult<Participant> {
        if token.as_str().is_empty() {
            return Err(SigningError::TokenExpired);
        }

        if let Some(participant) = self.ctx.storage.find_by_token(token).await? {
            let live = participant
                .live_credential(self.ctx.now())
                .map(|credential| credential.matches(token))
                .unwrap_or(false);
            if !live {
                debug!(participant_id = %participant.id, "Signing token past its expiry");
                return Err(SigningError::TokenExpired);
            }
            if participant.is_terminal() {
                return Err(SigningError::TokenAlreadyConsumed);
            }
            return Ok(participant);
        }

        if self
            .ctx
            .storage
            .find_by_consumed_digest(&token.digest())
            .await?
            .is_some()
        {
            return Err(SigningError::TokenAlreadyConsumed);
        }
        Err(SigningError::TokenExpired)
    }

    /// Check a token before any contract content is shown. Writes nothing.
    pub async fn validate(&self, token: &SigningToken) -> SigningResult<SigningSession> {
        let participant = self.resolve(token).await?;
        let contract = self.active_contract(&participant.contract_id).await?;
        session(participant, &contract)
    }

    /// Record that the link was opened: `sent` / `send_failed` -> `viewed`.
    ///
    /// Opening an already viewed link is a no-op.
    pub async fn open(&self, token: &SigningToken) -> SigningResult<SigningSession> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.resolve(token).await?;
            let contract = self.active_contract(&current.contract_id).await?;

            if current.status == ParticipantStatus::Viewed {
                return session(current, &contract);
            }
            if !current.status.can_transition_to(ParticipantStatus::Viewed) {
                return Err(SigningError::InvalidState(format!(
                    "participant {} is {} and cannot open the signing link",
                    current.id, current.status
                )));
            }

            let now = self.ctx.now();
            let id = current.id;
            let fence = ParticipantFence::of(&current);
            let mut next = current;
            next.status = ParticipantStatus::Viewed;
            next.viewed_at.get_or_insert(now);
            next.updated_at = now;

            match self.ctx.storage.replace_participant(fence, next).await {
                Ok(stored) => {
                    self.ctx
                        .record(SigningEvent::participant(
                            &stored,
                            SigningEventKind::Viewed,
                            LINK_ACTOR,
                            now,
                        ))
                        .await;
                    info!(participant_id = %id, from = %fence.status, "Signing link opened");
                    return session(stored, &contract);
                }
                Err(StorageError::Conflict(reason)) => {
                    debug!(participant_id = %id, attempt, %reason, "Open raced another write");
                }
                Err(err) => return Err(SigningError::from_participant_write(err, id)),
            }
        }

        Err(SigningError::InvalidState(
            "participant kept changing while the signing link was opened".to_string(),
        ))
    }

    /// Apply a signature: `viewed` -> `signed`.
    ///
    /// The signature record is written in the same step as the status, and
    /// the token is retired with it.
    pub async fn sign(
        &self,
        token: &SigningToken,
        submission: SignatureSubmission,
    ) -> SigningResult<Participant> {
        let current = self.resolve(token).await?;
        let submission = submission.normalize()?;
        let contract = self.active_contract(&current.contract_id).await?;
        require_viewed(&current, "signed")?;

        let now = self.ctx.now();
        let fence = ParticipantFence::of(&current);
        let mut next = current;
        next.status = ParticipantStatus::Signed;
        next.signature = Some(SignatureRecord {
            signed_at: now,
            signed_by: submission.signed_by.clone(),
            signature_data: submission.signature_data,
        });
        retire(&mut next, token, now);

        let stored = self.commit_terminal(fence, next, token).await?;
        self.ctx
            .record(
                SigningEvent::participant(
                    &stored,
                    SigningEventKind::Signed,
                    submission.signed_by.as_str(),
                    now,
                )
                .with_message(format!("signed by {}", submission.signed_by))
                .with_payload(json!({ "fingerprint": token.fingerprint() })),
            )
            .await;

        info!(
            contract_id = %stored.contract_id,
            participant_id = %stored.id,
            contract_number = %contract.contract_number,
            "Participant signed"
        );

        self.aggregator
            .settle(&stored.contract_id, LINK_ACTOR)
            .await;
        Ok(stored)
    }

    /// Record an explicit decline: `viewed` -> `declined`.
    pub async fn decline(
        &self,
        token: &SigningToken,
        reason: Option<String>,
    ) -> SigningResult<Participant> {
        let current = self.resolve(token).await?;
        let contract = self.active_contract(&current.contract_id).await?;
        require_viewed(&current, "declined")?;

        let now = self.ctx.now();
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let fence = ParticipantFence::of(&current);
        let mut next = current;
        next.status = ParticipantStatus::Declined;
        next.decline = Some(DeclineRecord {
            declined_at: now,
            reason: reason.clone(),
            waiver: None,
        });
        retire(&mut next, token, now);

        let stored = self.commit_terminal(fence, next, token).await?;
        self.ctx
            .record(
                SigningEvent::participant(&stored, SigningEventKind::Declined, LINK_ACTOR, now)
                    .with_payload(json!({
                        "reason": reason,
                        "fingerprint": token.fingerprint(),
                    })),
            )
            .await;

        warn!(
            contract_id = %stored.contract_id,
            participant_id = %stored.id,
            contract_number = %contract.contract_number,
            "Participant declined to sign"
        );

        self.aggregator
            .settle(&stored.contract_id, LINK_ACTOR)
            .await;
        Ok(stored)
    }

    /// Shareable signing URL for a participant's live token.
    pub async fn signing_link(
        &self,
        participant_id: &ParticipantId,
    ) -> SigningResult<SigningLink> {
        let participant = self.ctx.participant(participant_id).await?;
        let credential = participant
            .live_credential(self.ctx.now())
            .ok_or(SigningError::NoActiveToken(*participant_id))?;
        Ok(SigningLink::build(
            &self.ctx.config.signing_origin,
            &credential.token,
        ))
    }

    /// Land a terminal write, or explain why another write got there first.
    async fn commit_terminal(
        &self,
        fence: ParticipantFence,
        next: Participant,
        token: &SigningToken,
    ) -> SigningResult<Participant> {
        let id = next.id;
        match self.ctx.storage.replace_participant(fence, next).await {
            Ok(stored) => Ok(stored),
            Err(StorageError::NotFound(_)) => {
                warn!(participant_id = %id, "Participant removed while signing");
                Err(SigningError::ParticipantNotFound(id))
            }
            Err(StorageError::Conflict(reason)) => {
                warn!(participant_id = %id, %reason, "Signing token consumed concurrently");
                match self.resolve(token).await {
                    Err(err) => Err(err),
                    Ok(_) => Err(SigningError::TokenAlreadyConsumed),
                }
            }
            Err(err) => Err(SigningError::from_participant_write(err, id)),
        }
    }

    async fn active_contract(&self, contract_id: &ContractId) -> SigningResult<ContractRecord> {
        let contract = self.ctx.contract(contract_id).await?;
        if contract.voided {
            return Err(SigningError::InvalidState(format!(
                "contract {} has been voided",
                contract.contract_number
            )));
        }
        Ok(contract)
    }
}

fn require_viewed(participant: &Participant, target: &str) -> SigningResult<()> {
    if participant.status != ParticipantStatus::Viewed {
        return Err(SigningError::InvalidState(format!(
            "participant {} is {}; the signing link must be opened before it can be {}",
            participant.id, participant.status, target
        )));
    }
    Ok(())
}

/// Drop the live credential and remember which token it was.
fn retire(participant: &mut Participant, token: &SigningToken, now: DateTime<Utc>) {
    participant.credential = None;
    participant.consumed_token_digest = Some(token.digest());
    participant.updated_at = now;
}

fn session(participant: Participant, contract: &ContractRecord) -> SigningResult<SigningSession> {
    let expires_at = participant
        .credential
        .as_ref()
        .map(|c| c.expires_at)
        .ok_or(SigningError::TokenExpired)?;
    Ok(SigningSession {
        contract_id: contract.id,
        contract_number: contract.contract_number.clone(),
        expires_at,
        participant,
    })
}
