//! Shared handles every signing component works against.

use crate::clock::Clock;
use crate::config::SigningConfig;
use crate::error::{SigningError, SigningResult};
use chrono::{DateTime, Utc};
use cosign_storage::{
    ContractStore, CosignStorage, ParticipantStore, SigningEvent, SigningEventRecord,
    SigningEventStore,
};
use cosign_types::{ContractId, ContractRecord, Participant, ParticipantId};
use std::sync::Arc;
use tracing::warn;

/// Storage, clock and configuration shared by the signing components.
#[derive(Clone)]
pub struct SigningContext {
    pub storage: Arc<dyn CosignStorage>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<SigningConfig>,
}

impl SigningContext {
    pub fn new(
        storage: Arc<dyn CosignStorage>,
        clock: Arc<dyn Clock>,
        config: SigningConfig,
    ) -> SigningResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            clock,
            config: Arc::new(config),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn participant(&self, participant_id: &ParticipantId) -> SigningResult<Participant> {
        self.storage
            .get_participant(participant_id)
            .await?
            .ok_or(SigningError::ParticipantNotFound(*participant_id))
    }

    pub async fn contract(&self, contract_id: &ContractId) -> SigningResult<ContractRecord> {
        self.storage
            .get_contract(contract_id)
            .await?
            .ok_or(SigningError::ContractNotFound(*contract_id))
    }

    /// Append to the signing event log once the write it describes has
    /// landed. The write stands either way; a failed append is logged.
    pub async fn record(&self, event: SigningEvent) -> Option<SigningEventRecord> {
        let kind = event.kind;
        let contract_id = event.contract_id;
        let participant_id = event.participant_id;
        match self.storage.append_event(event).await {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    contract_id = %contract_id,
                    participant_id = ?participant_id,
                    kind = kind.as_str(),
                    error = %err,
                    "Signing event could not be recorded"
                );
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::ManualClock;
    use cosign_storage::InMemoryCosignStorage;
    use cosign_types::NewParticipant;

    pub(crate) fn context_with(clock: Arc<ManualClock>) -> SigningContext {
        SigningContext::new(
            Arc::new(InMemoryCosignStorage::new()),
            clock,
            SigningConfig::default().with_origin("https://app.example.com"),
        )
        .unwrap()
    }

    pub(crate) fn context() -> (SigningContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (context_with(clock.clone()), clock)
    }

    pub(crate) async fn seed_contract(ctx: &SigningContext, number: &str) -> ContractRecord {
        let record = ContractRecord::new(number, ctx.now());
        ctx.storage.create_contract(record.clone()).await.unwrap();
        record
    }

    pub(crate) async fn seed_participant(
        ctx: &SigningContext,
        contract_id: ContractId,
        input: NewParticipant,
    ) -> Participant {
        let participant = Participant::new(contract_id, input.normalize().unwrap(), ctx.now());
        ctx.storage.insert_participant(participant).await.unwrap()
    }
}
