use crate::model::{ParticipantFence, SigningEvent, SigningEventRecord};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosign_types::{
    ContractId, ContractRecord, ExecutionStatus, Participant, ParticipantId, PrimarySignature,
    SigningToken,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn latest(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Storage interface for mirrored contract records.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Register a contract. Fails with `Conflict` if the id is taken.
    async fn create_contract(&self, record: ContractRecord) -> StorageResult<()>;

    async fn get_contract(&self, contract_id: &ContractId) -> StorageResult<Option<ContractRecord>>;

    /// List records newest-first.
    async fn list_contracts(&self, window: QueryWindow) -> StorageResult<Vec<ContractRecord>>;

    /// Record the primary counterparty's signature state.
    async fn set_primary_signature(
        &self,
        contract_id: &ContractId,
        primary: PrimarySignature,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord>;

    /// Mark the contract void. Idempotent.
    async fn mark_voided(
        &self,
        contract_id: &ContractId,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord>;

    /// Transition the derived execution status from one value to another.
    async fn transition_execution_status(
        &self,
        contract_id: &ContractId,
        expected_from: ExecutionStatus,
        to: ExecutionStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord>;
}

/// Storage interface for contract participants.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Insert a participant, assigning `display_order` as the contract's
    /// current maximum plus one. Returns the stored record.
    async fn insert_participant(&self, participant: Participant) -> StorageResult<Participant>;

    async fn get_participant(
        &self,
        participant_id: &ParticipantId,
    ) -> StorageResult<Option<Participant>>;

    /// Participants of one contract by `display_order`, then `created_at`.
    async fn list_participants(&self, contract_id: &ContractId) -> StorageResult<Vec<Participant>>;

    /// Replace a participant if it still matches `expected`.
    ///
    /// Fails with `NotFound` if the record is gone, `Conflict` if the fence no
    /// longer holds, and `InvariantViolation` if the replacement rewrites an
    /// immutable field.
    async fn replace_participant(
        &self,
        expected: ParticipantFence,
        participant: Participant,
    ) -> StorageResult<Participant>;

    /// Delete a participant if it still matches `expected`.
    async fn delete_participant(
        &self,
        participant_id: &ParticipantId,
        expected: ParticipantFence,
    ) -> StorageResult<Participant>;

    /// Participant currently holding `token`, expired or not.
    async fn find_by_token(&self, token: &SigningToken) -> StorageResult<Option<Participant>>;

    /// Participant whose retired token has this digest.
    async fn find_by_consumed_digest(&self, digest: &str) -> StorageResult<Option<Participant>>;
}

/// Storage interface for the append-only signing event log.
#[async_trait]
pub trait SigningEventStore: Send + Sync {
    /// Append an event and return the canonical, hash-linked stored record.
    async fn append_event(&self, event: SigningEvent) -> StorageResult<SigningEventRecord>;

    /// Events of one contract, newest-first.
    async fn list_events(
        &self,
        contract_id: &ContractId,
        window: QueryWindow,
    ) -> StorageResult<Vec<SigningEventRecord>>;

    /// Get the latest event hash anchor.
    async fn latest_event_hash(&self) -> StorageResult<Option<String>>;
}

/// Unified storage bundle used by the signing engine.
pub trait CosignStorage: ContractStore + ParticipantStore + SigningEventStore + Send + Sync {}

impl<T> CosignStorage for T where
    T: ContractStore + ParticipantStore + SigningEventStore + Send + Sync
{
}
