use chrono::{DateTime, Utc};
use cosign_types::{ContractId, Participant, ParticipantId, ParticipantStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The state a participant write expects to replace.
///
/// A credential is current only while both the status and the token version
/// it was read with still hold, so this pair is enough to make validation and
/// transition one atomic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFence {
    pub status: ParticipantStatus,
    pub token_version: u64,
}

impl ParticipantFence {
    pub fn of(participant: &Participant) -> Self {
        Self {
            status: participant.status,
            token_version: participant.token_version,
        }
    }

    pub fn holds_for(&self, participant: &Participant) -> bool {
        participant.status == self.status && participant.token_version == self.token_version
    }
}

impl fmt::Display for ParticipantFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.status, self.token_version)
    }
}

/// Kind of entry in the signing event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningEventKind {
    ContractRegistered,
    PrimarySignatureRequested,
    PrimarySignatureRecorded,
    ContractVoided,
    ParticipantAdded,
    ParticipantUpdated,
    ParticipantRemoved,
    TokenIssued,
    InviteSent,
    InviteDelivered,
    DeliveryFailed,
    Viewed,
    Signed,
    Declined,
    DeclineWaived,
    ExecutionStatusChanged,
}

impl SigningEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningEventKind::ContractRegistered => "contract_registered",
            SigningEventKind::PrimarySignatureRequested => "primary_signature_requested",
            SigningEventKind::PrimarySignatureRecorded => "primary_signature_recorded",
            SigningEventKind::ContractVoided => "contract_voided",
            SigningEventKind::ParticipantAdded => "participant_added",
            SigningEventKind::ParticipantUpdated => "participant_updated",
            SigningEventKind::ParticipantRemoved => "participant_removed",
            SigningEventKind::TokenIssued => "token_issued",
            SigningEventKind::InviteSent => "invite_sent",
            SigningEventKind::InviteDelivered => "invite_delivered",
            SigningEventKind::DeliveryFailed => "delivery_failed",
            SigningEventKind::Viewed => "viewed",
            SigningEventKind::Signed => "signed",
            SigningEventKind::Declined => "declined",
            SigningEventKind::DeclineWaived => "decline_waived",
            SigningEventKind::ExecutionStatusChanged => "execution_status_changed",
        }
    }
}

impl fmt::Display for SigningEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event append payload. Hashes and sequencing are assigned by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub contract_id: ContractId,
    pub participant_id: Option<ParticipantId>,
    pub kind: SigningEventKind,
    pub message: String,
    #[serde(default)]
    pub payload: Value,
}

impl SigningEvent {
    pub fn contract(
        contract_id: ContractId,
        kind: SigningEventKind,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            actor: actor.into(),
            contract_id,
            participant_id: None,
            kind,
            message: kind.as_str().to_string(),
            payload: Value::Null,
        }
    }

    pub fn participant(
        participant: &Participant,
        kind: SigningEventKind,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            participant_id: Some(participant.id),
            ..Self::contract(participant.contract_id, kind, actor, timestamp)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Persistent tamper-evident event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningEventRecord {
    pub event_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub contract_id: ContractId,
    pub participant_id: Option<ParticipantId>,
    pub kind: SigningEventKind,
    pub message: String,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub hash: String,
}
