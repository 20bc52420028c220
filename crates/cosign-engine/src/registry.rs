//! Participant Registry: the set of additional parties on a contract.

use crate::aggregator::CompletionAggregator;
use crate::context::SigningContext;
use crate::error::{SigningError, SigningResult};
use cosign_storage::{ParticipantFence, ParticipantStore, SigningEvent, SigningEventKind};
use cosign_types::{
    ContractId, ContractRecord, DeclineWaiver, NewParticipant, Participant, ParticipantDetails,
    ParticipantId, ParticipantStatus,
};
use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ParticipantRegistry {
    ctx: SigningContext,
    aggregator: CompletionAggregator,
}

impl ParticipantRegistry {
    pub fn new(ctx: SigningContext, aggregator: CompletionAggregator) -> Self {
        Self { ctx, aggregator }
    }

    /// Attach a new `pending` participant to a contract.
    pub async fn add(
        &self,
        contract_id: &ContractId,
        input: NewParticipant,
        actor: &str,
    ) -> SigningResult<Participant> {
        let input = self.prepare(input)?;
        let contract = self.open_contract(contract_id).await?;

        let now = self.ctx.now();
        let stored = self
            .ctx
            .storage
            .insert_participant(Participant::new(contract.id, input, now))
            .await
            .map_err(|e| SigningError::from_contract_write(e, contract.id))?;

        self.ctx
            .record(
                SigningEvent::participant(&stored, SigningEventKind::ParticipantAdded, actor, now)
                    .with_message(format!("{} added as {}", stored.name, stored.role))
                    .with_payload(json!({
                        "name": stored.name,
                        "role": stored.role,
                        "display_order": stored.display_order,
                    })),
            )
            .await;

        info!(
            contract_id = %contract_id,
            participant_id = %stored.id,
            display_order = stored.display_order,
            "Participant added"
        );

        self.aggregator.settle(contract_id, actor).await;
        Ok(stored)
    }

    /// Participants of a contract by display order.
    pub async fn list(&self, contract_id: &ContractId) -> SigningResult<Vec<Participant>> {
        self.ctx.contract(contract_id).await?;
        Ok(self.ctx.storage.list_participants(contract_id).await?)
    }

    pub async fn get(&self, participant_id: &ParticipantId) -> SigningResult<Participant> {
        self.ctx.participant(participant_id).await
    }

    /// Edit name, contact channels, role, title or notes of a participant
    /// that has not yet signed or declined.
    pub async fn update_details(
        &self,
        participant_id: &ParticipantId,
        details: ParticipantDetails,
        actor: &str,
    ) -> SigningResult<Participant> {
        let details = self.prepare(details)?;
        let current = self.ctx.participant(participant_id).await?;
        if current.is_terminal() {
            return Err(SigningError::InvalidState(format!(
                "participant {} is {} and can no longer be edited",
                participant_id, current.status
            )));
        }
        self.open_contract(&current.contract_id).await?;

        let now = self.ctx.now();
        let fence = ParticipantFence::of(&current);
        let mut next = current;
        next.apply_details(details, now);

        let stored = self
            .ctx
            .storage
            .replace_participant(fence, next)
            .await
            .map_err(|e| SigningError::from_participant_write(e, *participant_id))?;

        self.ctx
            .record(SigningEvent::participant(
                &stored,
                SigningEventKind::ParticipantUpdated,
                actor,
                now,
            ))
            .await;

        debug!(participant_id = %participant_id, "Participant details updated");
        Ok(stored)
    }

    /// Remove a participant that has not signed.
    ///
    /// Removing a `declined` participant is how an admin lets the contract
    /// execute without them. The delete is fenced on the status read here,
    /// so a signature landing first wins.
    pub async fn remove(
        &self,
        participant_id: &ParticipantId,
        actor: &str,
    ) -> SigningResult<Participant> {
        let current = self.ctx.participant(participant_id).await?;
        if !current.status.is_removable() {
            warn!(participant_id = %participant_id, "Refusing to delete a signed participant");
            return Err(SigningError::InvalidState(format!(
                "participant {} has signed; the signature is part of the contract record",
                participant_id
            )));
        }
        self.open_contract(&current.contract_id).await?;

        let removed = self
            .ctx
            .storage
            .delete_participant(participant_id, ParticipantFence::of(&current))
            .await
            .map_err(|e| SigningError::from_participant_write(e, *participant_id))?;

        let now = self.ctx.now();
        self.ctx
            .record(
                SigningEvent::participant(
                    &removed,
                    SigningEventKind::ParticipantRemoved,
                    actor,
                    now,
                )
                .with_message(format!("{} removed while {}", removed.name, removed.status)),
            )
            .await;

        info!(
            contract_id = %removed.contract_id,
            participant_id = %participant_id,
            status = %removed.status,
            "Participant removed"
        );

        self.aggregator.settle(&removed.contract_id, actor).await;
        Ok(removed)
    }

    /// Administrative override of a decline.
    ///
    /// The participant stays `declined` but no longer blocks execution.
    /// Waiving an already-waived decline returns the participant unchanged.
    pub async fn waive_decline(
        &self,
        participant_id: &ParticipantId,
        waived_by: &str,
        reason: Option<String>,
    ) -> SigningResult<Participant> {
        let waived_by = waived_by.trim();
        if waived_by.is_empty() {
            return Err(SigningError::InvalidInput(
                "a decline waiver must name who granted it".to_string(),
            ));
        }

        let current = self.ctx.participant(participant_id).await?;
        if current.status != ParticipantStatus::Declined {
            return Err(SigningError::InvalidState(format!(
                "participant {} is {}; only a decline can be waived",
                participant_id, current.status
            )));
        }
        if current.is_decline_waived() {
            return Ok(current);
        }
        self.open_contract(&current.contract_id).await?;

        let now = self.ctx.now();
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let fence = ParticipantFence::of(&current);
        let mut next = current;
        if let Some(decline) = next.decline.as_mut() {
            decline.waiver = Some(DeclineWaiver {
                waived_at: now,
                waived_by: waived_by.to_string(),
                reason: reason.clone(),
            });
        }
        next.updated_at = now;

        let stored = self
            .ctx
            .storage
            .replace_participant(fence, next)
            .await
            .map_err(|e| SigningError::from_participant_write(e, *participant_id))?;

        self.ctx
            .record(
                SigningEvent::participant(&stored, SigningEventKind::DeclineWaived, waived_by, now)
                    .with_payload(json!({ "reason": reason })),
            )
            .await;

        info!(
            contract_id = %stored.contract_id,
            participant_id = %participant_id,
            waived_by = %waived_by,
            "Decline waived"
        );

        self.aggregator.settle(&stored.contract_id, waived_by).await;
        Ok(stored)
    }

    fn prepare(&self, input: NewParticipant) -> SigningResult<NewParticipant> {
        let mut input = input
            .normalize()
            .map_err(|e| SigningError::InvalidInput(e.to_string()))?;
        if input.role.is_none() {
            input.role = Some(self.ctx.config.default_role.clone());
        }
        Ok(input)
    }

    async fn open_contract(&self, contract_id: &ContractId) -> SigningResult<ContractRecord> {
        let contract = self.ctx.contract(contract_id).await?;
        if !contract.accepts_participant_changes() {
            return Err(SigningError::InvalidState(format!(
                "contract {} is {}; its participant list is closed",
                contract.contract_number, contract.execution_status
            )));
        }
        Ok(contract)
    }
}
