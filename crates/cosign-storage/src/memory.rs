//! In-memory reference implementation for the cosign storage traits.
//!
//! This adapter is deterministic and test-friendly. Every check-and-set runs
//! under a single write lock, which gives the same single-winner guarantee a
//! transactional backend gets from a conditional `UPDATE ... WHERE`.

use crate::model::{ParticipantFence, SigningEvent, SigningEventRecord};
use crate::traits::{ContractStore, ParticipantStore, QueryWindow, SigningEventStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosign_types::{
    ContractId, ContractRecord, ExecutionStatus, Participant, ParticipantId, ParticipantStatus,
    PrimarySignature, SigningToken,
};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory cosign storage adapter.
#[derive(Default)]
pub struct InMemoryCosignStorage {
    contracts: RwLock<HashMap<ContractId, ContractRecord>>,
    participants: RwLock<HashMap<ParticipantId, Participant>>,
    events: RwLock<Vec<SigningEventRecord>>,
}

impl InMemoryCosignStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(name: &str) -> StorageError {
    StorageError::Backend(format!("{} lock poisoned", name))
}

#[async_trait]
impl ContractStore for InMemoryCosignStorage {
    async fn create_contract(&self, record: ContractRecord) -> StorageResult<()> {
        if record.contract_number.trim().is_empty() {
            return Err(StorageError::InvalidInput(
                "contract number must not be empty".to_string(),
            ));
        }

        let mut guard = self.contracts.write().map_err(|_| poisoned("contracts"))?;
        if guard.contains_key(&record.id) {
            return Err(StorageError::Conflict(format!(
                "contract {} already exists",
                record.id
            )));
        }
        guard.insert(record.id, record);
        Ok(())
    }

    async fn get_contract(&self, contract_id: &ContractId) -> StorageResult<Option<ContractRecord>> {
        let guard = self.contracts.read().map_err(|_| poisoned("contracts"))?;
        Ok(guard.get(contract_id).cloned())
    }

    async fn list_contracts(&self, window: QueryWindow) -> StorageResult<Vec<ContractRecord>> {
        let guard = self.contracts.read().map_err(|_| poisoned("contracts"))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn set_primary_signature(
        &self,
        contract_id: &ContractId,
        primary: PrimarySignature,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord> {
        let mut guard = self.contracts.write().map_err(|_| poisoned("contracts"))?;
        let record = guard
            .get_mut(contract_id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", contract_id)))?;

        if record.primary == PrimarySignature::Signed && primary != PrimarySignature::Signed {
            return Err(StorageError::InvariantViolation(format!(
                "primary signature on contract {} cannot be withdrawn",
                contract_id
            )));
        }

        record.primary = primary;
        record.updated_at = updated_at;
        Ok(record.clone())
    }

    async fn mark_voided(
        &self,
        contract_id: &ContractId,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord> {
        let mut guard = self.contracts.write().map_err(|_| poisoned("contracts"))?;
        let record = guard
            .get_mut(contract_id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", contract_id)))?;
        if !record.voided {
            record.voided = true;
            record.updated_at = updated_at;
        }
        Ok(record.clone())
    }

    async fn transition_execution_status(
        &self,
        contract_id: &ContractId,
        expected_from: ExecutionStatus,
        to: ExecutionStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ContractRecord> {
        let mut guard = self.contracts.write().map_err(|_| poisoned("contracts"))?;
        let record = guard
            .get_mut(contract_id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", contract_id)))?;

        if record.execution_status != expected_from {
            return Err(StorageError::Conflict(format!(
                "execution status of {}: expected {}, found {}",
                contract_id, expected_from, record.execution_status
            )));
        }

        record.execution_status = to;
        record.updated_at = updated_at;
        Ok(record.clone())
    }
}

#[async_trait]
impl ParticipantStore for InMemoryCosignStorage {
    async fn insert_participant(&self, mut participant: Participant) -> StorageResult<Participant> {
        if participant.status == ParticipantStatus::Pending && participant.credential.is_some() {
            return Err(StorageError::InvariantViolation(format!(
                "pending participant {} cannot carry a signing token",
                participant.id
            )));
        }

        {
            let contracts = self.contracts.read().map_err(|_| poisoned("contracts"))?;
            if !contracts.contains_key(&participant.contract_id) {
                return Err(StorageError::NotFound(format!(
                    "contract {} not found",
                    participant.contract_id
                )));
            }
        }

        let mut guard = self
            .participants
            .write()
            .map_err(|_| poisoned("participants"))?;

        if guard.contains_key(&participant.id) {
            return Err(StorageError::Conflict(format!(
                "participant {} already exists",
                participant.id
            )));
        }

        let max_order = guard
            .values()
            .filter(|p| p.contract_id == participant.contract_id)
            .map(|p| p.display_order)
            .max()
            .unwrap_or(0);
        participant.display_order = max_order + 1;

        guard.insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn get_participant(
        &self,
        participant_id: &ParticipantId,
    ) -> StorageResult<Option<Participant>> {
        let guard = self
            .participants
            .read()
            .map_err(|_| poisoned("participants"))?;
        Ok(guard.get(participant_id).cloned())
    }

    async fn list_participants(&self, contract_id: &ContractId) -> StorageResult<Vec<Participant>> {
        let guard = self
            .participants
            .read()
            .map_err(|_| poisoned("participants"))?;
        let mut values = guard
            .values()
            .filter(|p| p.contract_id == *contract_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(values)
    }

    async fn replace_participant(
        &self,
        expected: ParticipantFence,
        participant: Participant,
    ) -> StorageResult<Participant> {
        let mut guard = self
            .participants
            .write()
            .map_err(|_| poisoned("participants"))?;
        let current = guard.get_mut(&participant.id).ok_or_else(|| {
            StorageError::NotFound(format!("participant {} not found", participant.id))
        })?;

        if !expected.holds_for(current) {
            return Err(StorageError::Conflict(format!(
                "participant {}: expected {}, found {}",
                participant.id,
                expected,
                ParticipantFence::of(current)
            )));
        }

        check_replacement(current, &participant)?;

        *current = participant.clone();
        Ok(participant)
    }

    async fn delete_participant(
        &self,
        participant_id: &ParticipantId,
        expected: ParticipantFence,
    ) -> StorageResult<Participant> {
        let mut guard = self
            .participants
            .write()
            .map_err(|_| poisoned("participants"))?;
        let current = guard.get(participant_id).ok_or_else(|| {
            StorageError::NotFound(format!("participant {} not found", participant_id))
        })?;

        if !expected.holds_for(current) {
            return Err(StorageError::Conflict(format!(
                "participant {}: expected {}, found {}",
                participant_id,
                expected,
                ParticipantFence::of(current)
            )));
        }

        if !current.status.is_removable() {
            return Err(StorageError::InvariantViolation(format!(
                "participant {} is {} and part of the signing record",
                participant_id, current.status
            )));
        }

        guard.remove(participant_id).ok_or_else(|| {
            StorageError::NotFound(format!("participant {} not found", participant_id))
        })
    }

    async fn find_by_token(&self, token: &SigningToken) -> StorageResult<Option<Participant>> {
        let guard = self
            .participants
            .read()
            .map_err(|_| poisoned("participants"))?;
        Ok(guard
            .values()
            .find(|p| {
                p.credential
                    .as_ref()
                    .map(|credential| credential.matches(token))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn find_by_consumed_digest(&self, digest: &str) -> StorageResult<Option<Participant>> {
        let guard = self
            .participants
            .read()
            .map_err(|_| poisoned("participants"))?;
        Ok(guard
            .values()
            .find(|p| p.consumed_token_digest.as_deref() == Some(digest))
            .cloned())
    }
}

/// Reject replacements that rewrite what the signing record treats as fixed.
fn check_replacement(current: &Participant, next: &Participant) -> StorageResult<()> {
    let violation = |what: &str| {
        Err(StorageError::InvariantViolation(format!(
            "participant {}: {}",
            current.id, what
        )))
    };

    if next.contract_id != current.contract_id {
        return violation("contract_id is immutable");
    }
    if next.display_order != current.display_order || next.created_at != current.created_at {
        return violation("display_order and created_at are assigned once");
    }
    if current.status.is_terminal() && next.status != current.status {
        return violation("terminal status cannot change");
    }
    if current.signature.is_some() && next.signature != current.signature {
        return violation("signature record is immutable");
    }
    if next.token_version < current.token_version {
        return violation("token version cannot move backwards");
    }
    if next.status == ParticipantStatus::Pending && next.credential.is_some() {
        return violation("pending participant cannot carry a signing token");
    }
    Ok(())
}

#[async_trait]
impl SigningEventStore for InMemoryCosignStorage {
    async fn append_event(&self, event: SigningEvent) -> StorageResult<SigningEventRecord> {
        let mut guard = self.events.write().map_err(|_| poisoned("events"))?;

        let previous_hash = guard.last().map(|e| e.hash.clone());
        let sequence = guard.len() as u64 + 1;
        let hash = compute_event_hash(&event, previous_hash.as_deref(), sequence)?;

        let record = SigningEventRecord {
            event_id: format!("evt-{}", Uuid::new_v4()),
            sequence,
            timestamp: event.timestamp,
            actor: event.actor,
            contract_id: event.contract_id,
            participant_id: event.participant_id,
            kind: event.kind,
            message: event.message,
            payload: event.payload,
            previous_hash,
            hash,
        };

        guard.push(record.clone());
        Ok(record)
    }

    async fn list_events(
        &self,
        contract_id: &ContractId,
        window: QueryWindow,
    ) -> StorageResult<Vec<SigningEventRecord>> {
        let guard = self.events.read().map_err(|_| poisoned("events"))?;
        let mut values = guard
            .iter()
            .filter(|e| e.contract_id == *contract_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn latest_event_hash(&self) -> StorageResult<Option<String>> {
        let guard = self.events.read().map_err(|_| poisoned("events"))?;
        Ok(guard.last().map(|e| e.hash.clone()))
    }
}

fn compute_event_hash(
    event: &SigningEvent,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "timestamp": event.timestamp,
        "actor": event.actor,
        "contract_id": event.contract_id,
        "participant_id": event.participant_id,
        "kind": event.kind,
        "message": event.message,
        "payload": event.payload,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningEventKind;
    use chrono::Duration;
    use cosign_types::{NewParticipant, SignatureRecord, SigningCredential};

    async fn seeded() -> (InMemoryCosignStorage, ContractRecord) {
        let storage = InMemoryCosignStorage::new();
        let contract = ContractRecord::new("CTR-1001", Utc::now());
        storage.create_contract(contract.clone()).await.unwrap();
        (storage, contract)
    }

    fn pending(contract: &ContractRecord, name: &str) -> Participant {
        Participant::new(
            contract.id,
            NewParticipant::named(name).normalize().unwrap(),
            Utc::now(),
        )
    }

    fn credential(token: &str, version: u64) -> SigningCredential {
        let now = Utc::now();
        SigningCredential {
            token: SigningToken::new(token),
            issued_at: now,
            expires_at: now + Duration::days(30),
            version,
        }
    }

    #[tokio::test]
    async fn display_order_is_max_plus_one_and_survives_gaps() {
        let (storage, contract) = seeded().await;
        let a = storage
            .insert_participant(pending(&contract, "A"))
            .await
            .unwrap();
        let b = storage
            .insert_participant(pending(&contract, "B"))
            .await
            .unwrap();
        assert_eq!((a.display_order, b.display_order), (1, 2));

        storage
            .delete_participant(&a.id, ParticipantFence::of(&a))
            .await
            .unwrap();
        let c = storage
            .insert_participant(pending(&contract, "C"))
            .await
            .unwrap();
        assert_eq!(c.display_order, 3);

        let listed = storage.list_participants(&contract.id).await.unwrap();
        let names: Vec<_> = listed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn insert_requires_known_contract() {
        let storage = InMemoryCosignStorage::new();
        let orphan = Participant::new(
            ContractId::generate(),
            NewParticipant::named("X").normalize().unwrap(),
            Utc::now(),
        );
        let err = storage.insert_participant(orphan).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn stale_fence_is_a_conflict() {
        let (storage, contract) = seeded().await;
        let stored = storage
            .insert_participant(pending(&contract, "A"))
            .await
            .unwrap();
        let fence = ParticipantFence::of(&stored);

        let mut sent = stored.clone();
        sent.status = ParticipantStatus::Sent;
        sent.token_version = 1;
        sent.credential = Some(credential("tok-1", 1));
        storage.replace_participant(fence, sent.clone()).await.unwrap();

        // Second writer still holding the pending fence loses.
        let err = storage.replace_participant(fence, sent).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn signature_and_terminal_status_are_immutable() {
        let (storage, contract) = seeded().await;
        let stored = storage
            .insert_participant(pending(&contract, "A"))
            .await
            .unwrap();

        let mut signed = stored.clone();
        signed.status = ParticipantStatus::Signed;
        signed.signature = Some(SignatureRecord {
            signed_at: Utc::now(),
            signed_by: "A".into(),
            signature_data: "data:image/png;base64,AAAA".into(),
        });
        let signed = storage
            .replace_participant(ParticipantFence::of(&stored), signed)
            .await
            .unwrap();

        let mut reopened = signed.clone();
        reopened.status = ParticipantStatus::Viewed;
        let err = storage
            .replace_participant(ParticipantFence::of(&signed), reopened)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvariantViolation(_)));

        let err = storage
            .delete_participant(&signed.id, ParticipantFence::of(&signed))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn token_lookups() {
        let (storage, contract) = seeded().await;
        let stored = storage
            .insert_participant(pending(&contract, "A"))
            .await
            .unwrap();
        let mut sent = stored.clone();
        sent.status = ParticipantStatus::Sent;
        sent.token_version = 1;
        sent.credential = Some(credential("tok-live", 1));
        sent.consumed_token_digest = Some("digest-old".into());
        storage
            .replace_participant(ParticipantFence::of(&stored), sent)
            .await
            .unwrap();

        let found = storage
            .find_by_token(&SigningToken::new("tok-live"))
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(stored.id));
        assert!(storage
            .find_by_token(&SigningToken::new("tok-other"))
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .find_by_consumed_digest("digest-old")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn execution_status_transition_is_fenced() {
        let (storage, contract) = seeded().await;
        storage
            .transition_execution_status(
                &contract.id,
                ExecutionStatus::Draft,
                ExecutionStatus::AwaitingSignatures,
                Utc::now(),
            )
            .await
            .unwrap();
        let err = storage
            .transition_execution_status(
                &contract.id,
                ExecutionStatus::Draft,
                ExecutionStatus::Executed,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn primary_signature_cannot_be_withdrawn() {
        let (storage, contract) = seeded().await;
        storage
            .set_primary_signature(&contract.id, PrimarySignature::Signed, Utc::now())
            .await
            .unwrap();
        let err = storage
            .set_primary_signature(&contract.id, PrimarySignature::Awaiting, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn event_chain_hashes_are_linked() {
        let (storage, contract) = seeded().await;
        let first = storage
            .append_event(SigningEvent::contract(
                contract.id,
                SigningEventKind::ContractRegistered,
                "admin",
                Utc::now(),
            ))
            .await
            .unwrap();
        let second = storage
            .append_event(
                SigningEvent::contract(
                    contract.id,
                    SigningEventKind::PrimarySignatureRequested,
                    "admin",
                    Utc::now() + Duration::seconds(1),
                )
                .with_payload(serde_json::json!({"channel": "email"})),
            )
            .await
            .unwrap();

        assert_eq!(second.previous_hash.as_deref(), Some(first.hash.as_str()));
        assert_eq!(
            storage.latest_event_hash().await.unwrap(),
            Some(second.hash.clone())
        );

        let listed = storage
            .list_events(&contract.id, QueryWindow::latest(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sequence, 2);
    }
}
