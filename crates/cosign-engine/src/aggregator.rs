//! Contract Completion Aggregator.
//!
//! The contract's execution status is a pure function of the primary
//! signature state and every participant's status; [`evaluate`] computes it
//! and [`CompletionAggregator::recompute`] stores it when it changed.

use crate::context::SigningContext;
use crate::error::{SigningError, SigningResult};
use cosign_storage::{
    ContractStore, ParticipantStore, SigningEvent, SigningEventKind, StorageError,
};
use cosign_types::{
    ContractId, ContractRecord, ExecutionStatus, Participant, ParticipantId, ParticipantStatus,
    PrimarySignature,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: usize = 3;

/// Participants per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub sent: usize,
    pub send_failed: usize,
    pub viewed: usize,
    pub signed: usize,
    pub declined: usize,
}

impl StatusCounts {
    pub fn tally(participants: &[Participant]) -> Self {
        let mut counts = Self::default();
        for participant in participants {
            *counts.slot(participant.status) += 1;
        }
        counts
    }

    pub fn get(&self, status: ParticipantStatus) -> usize {
        match status {
            ParticipantStatus::Pending => self.pending,
            ParticipantStatus::Sent => self.sent,
            ParticipantStatus::SendFailed => self.send_failed,
            ParticipantStatus::Viewed => self.viewed,
            ParticipantStatus::Signed => self.signed,
            ParticipantStatus::Declined => self.declined,
        }
    }

    fn slot(&mut self, status: ParticipantStatus) -> &mut usize {
        match status {
            ParticipantStatus::Pending => &mut self.pending,
            ParticipantStatus::Sent => &mut self.sent,
            ParticipantStatus::SendFailed => &mut self.send_failed,
            ParticipantStatus::Viewed => &mut self.viewed,
            ParticipantStatus::Signed => &mut self.signed,
            ParticipantStatus::Declined => &mut self.declined,
        }
    }
}

/// Derived completion state of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub contract_id: ContractId,
    pub status: ExecutionStatus,
    pub primary: PrimarySignature,
    pub total: usize,
    pub counts: StatusCounts,
    /// Participants still standing between the contract and execution,
    /// sorted by id.
    pub blocking: Vec<ParticipantId>,
}

impl ExecutionReport {
    pub fn is_executed(&self) -> bool {
        self.status == ExecutionStatus::Executed
    }
}

/// Derive the execution status of `contract` from its participants.
///
/// Pure and order-independent: the same contract state and participant set
/// always give the same report.
pub fn evaluate(contract: &ContractRecord, participants: &[Participant]) -> ExecutionReport {
    let mut blocking: Vec<ParticipantId> = participants
        .iter()
        .filter(|p| p.blocks_execution())
        .map(|p| p.id)
        .collect();
    blocking.sort();

    let status = if contract.voided {
        ExecutionStatus::Void
    } else if contract.primary == PrimarySignature::Signed && blocking.is_empty() {
        ExecutionStatus::Executed
    } else if contract.primary == PrimarySignature::NotRequested
        && participants
            .iter()
            .all(|p| p.status == ParticipantStatus::Pending)
    {
        ExecutionStatus::Draft
    } else {
        ExecutionStatus::AwaitingSignatures
    };

    ExecutionReport {
        contract_id: contract.id,
        status,
        primary: contract.primary,
        total: participants.len(),
        counts: StatusCounts::tally(participants),
        blocking,
    }
}

/// Keeps the stored execution status in line with [`evaluate`].
#[derive(Clone)]
pub struct CompletionAggregator {
    ctx: SigningContext,
}

impl CompletionAggregator {
    pub fn new(ctx: SigningContext) -> Self {
        Self { ctx }
    }

    /// Current report without writing anything.
    pub async fn report(&self, contract_id: &ContractId) -> SigningResult<ExecutionReport> {
        let contract = self.ctx.contract(contract_id).await?;
        let participants = self.ctx.storage.list_participants(contract_id).await?;
        Ok(evaluate(&contract, &participants))
    }

    /// Re-derive and store the execution status of `contract_id`.
    pub async fn recompute(
        &self,
        contract_id: &ContractId,
        actor: &str,
    ) -> SigningResult<ExecutionReport> {
        for attempt in 1..=MAX_ATTEMPTS {
            let contract = self.ctx.contract(contract_id).await?;
            let participants = self.ctx.storage.list_participants(contract_id).await?;
            let report = evaluate(&contract, &participants);

            if report.status == contract.execution_status {
                debug!(
                    contract_id = %contract_id,
                    status = %report.status,
                    "Execution status unchanged"
                );
                return Ok(report);
            }

            let now = self.ctx.now();
            match self
                .ctx
                .storage
                .transition_execution_status(
                    contract_id,
                    contract.execution_status,
                    report.status,
                    now,
                )
                .await
            {
                Ok(_) => {
                    self.ctx
                        .record(
                            SigningEvent::contract(
                                *contract_id,
                                SigningEventKind::ExecutionStatusChanged,
                                actor,
                                now,
                            )
                            .with_message(format!(
                                "{} -> {}",
                                contract.execution_status, report.status
                            ))
                            .with_payload(json!({
                                "from": contract.execution_status,
                                "to": report.status,
                                "blocking": report.blocking.len(),
                            })),
                        )
                        .await;

                    info!(
                        contract_id = %contract_id,
                        from = %contract.execution_status,
                        to = %report.status,
                        "Execution status changed"
                    );
                    return Ok(report);
                }
                Err(StorageError::Conflict(reason)) => {
                    debug!(
                        contract_id = %contract_id,
                        attempt,
                        %reason,
                        "Execution status moved during recompute"
                    );
                }
                Err(err) => return Err(SigningError::from_contract_write(err, *contract_id)),
            }
        }

        Err(SigningError::InvalidState(format!(
            "execution status of contract {} kept changing during recompute",
            contract_id
        )))
    }

    /// Recompute after a participant write that has already landed.
    ///
    /// The write is not undone if this fails; the next change on the
    /// contract, or an explicit [`CompletionAggregator::recompute`], catches up.
    pub async fn settle(&self, contract_id: &ContractId, actor: &str) -> Option<ExecutionReport> {
        match self.recompute(contract_id, actor).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(
                    contract_id = %contract_id,
                    error = %err,
                    "Execution status not recomputed after a committed write"
                );
                None
            }
        }
    }
}
