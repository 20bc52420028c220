//! Contract participants and their signing lifecycle.
//!
//! Participants sign in parallel; `display_order` is presentation only and
//! never implies a signing sequence.

use crate::{ContractId, ParticipantId, SigningCredential};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Role assigned when the admin does not pick one.
pub const DEFAULT_PARTICIPANT_ROLE: &str = "Additional Signer";

/// Roles offered by the admin tooling. Role is informational only.
pub const WELL_KNOWN_ROLES: &[&str] = &[
    DEFAULT_PARTICIPANT_ROLE,
    "Witness",
    "Co-signer",
    "Third Party",
    "Authorized Representative",
];

/// Participant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Added to the contract, never invited
    #[default]
    Pending,
    /// Invitation written and handed to the mailer
    Sent,
    /// Invitation written but the mailer reported a failure
    SendFailed,
    /// Signing link opened with a valid token
    Viewed,
    /// Signature recorded (terminal)
    Signed,
    /// Participant refused to sign (terminal)
    Declined,
}

impl ParticipantStatus {
    pub const ALL: [ParticipantStatus; 6] = [
        ParticipantStatus::Pending,
        ParticipantStatus::Sent,
        ParticipantStatus::SendFailed,
        ParticipantStatus::Viewed,
        ParticipantStatus::Signed,
        ParticipantStatus::Declined,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantStatus::Signed | ParticipantStatus::Declined)
    }

    /// Whether an invitation has been written for this participant.
    pub fn is_invited(&self) -> bool {
        !matches!(self, ParticipantStatus::Pending)
    }

    /// Whether a signed record may be removed from the contract.
    pub fn is_removable(&self) -> bool {
        !matches!(self, ParticipantStatus::Signed)
    }

    /// Edge table of the participant state machine.
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        match (self, next) {
            (Signed | Declined, _) => false,
            (Pending, Sent) => true,
            (Sent | SendFailed | Viewed, Sent) => true,
            (Sent, SendFailed) => true,
            (Sent | SendFailed | Viewed, Viewed) => true,
            (Viewed, Signed | Declined) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Sent => "sent",
            ParticipantStatus::SendFailed => "send_failed",
            ParticipantStatus::Viewed => "viewed",
            ParticipantStatus::Signed => "signed",
            ParticipantStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature captured by the signing surface. Written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signed_at: DateTime<Utc>,
    pub signed_by: String,
    pub signature_data: String,
}

/// Administrative override that stops a decline from blocking execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineWaiver {
    pub waived_at: DateTime<Utc>,
    pub waived_by: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineRecord {
    pub declined_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub waiver: Option<DeclineWaiver>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParticipantValidationError {
    #[error("participant name is required")]
    EmptyName,
}

/// Admin input for a new participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewParticipant {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewParticipant {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Trim every field, drop empty optionals, reject an empty name.
    pub fn normalize(self) -> Result<Self, ParticipantValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ParticipantValidationError::EmptyName);
        }
        Ok(Self {
            name,
            email: clean(self.email),
            phone: clean(self.phone),
            role: clean(self.role),
            title: clean(self.title),
            notes: clean(self.notes),
        })
    }
}

/// Editable participant fields. Same shape and rules as [`NewParticipant`].
pub type ParticipantDetails = NewParticipant;

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// An additional party whose signature a contract requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub contract_id: ContractId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub status: ParticipantStatus,
    /// Live credential, if any.
    pub credential: Option<SigningCredential>,
    /// Bumped on every issue; the fence for check-and-set writes.
    pub token_version: u64,
    /// Digest of the token retired by a terminal transition.
    pub consumed_token_digest: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub signature: Option<SignatureRecord>,
    pub decline: Option<DeclineRecord>,
    pub display_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Build a pending participant from already-normalized input.
    /// `display_order` is assigned by storage on insert.
    pub fn new(contract_id: ContractId, input: NewParticipant, now: DateTime<Utc>) -> Self {
        Self {
            id: ParticipantId::generate(),
            contract_id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            role: input
                .role
                .unwrap_or_else(|| DEFAULT_PARTICIPANT_ROLE.to_string()),
            title: input.title,
            notes: input.notes,
            status: ParticipantStatus::Pending,
            credential: None,
            token_version: 0,
            consumed_token_digest: None,
            sent_at: None,
            viewed_at: None,
            signature: None,
            decline: None,
            display_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Email is the only channel invitations go out on.
    pub fn signing_channel(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    /// Credential that can still be used at `now`.
    pub fn live_credential(&self, now: DateTime<Utc>) -> Option<&SigningCredential> {
        self.credential
            .as_ref()
            .filter(|credential| !credential.is_expired(now))
    }

    pub fn is_decline_waived(&self) -> bool {
        self.decline
            .as_ref()
            .map(|d| d.waiver.is_some())
            .unwrap_or(false)
    }

    /// Whether this participant keeps the contract from executing.
    pub fn blocks_execution(&self) -> bool {
        match self.status {
            ParticipantStatus::Signed => false,
            ParticipantStatus::Declined => !self.is_decline_waived(),
            _ => true,
        }
    }

    pub fn apply_details(&mut self, details: ParticipantDetails, now: DateTime<Utc>) {
        self.name = details.name;
        self.email = details.email;
        self.phone = details.phone;
        self.role = details
            .role
            .unwrap_or_else(|| DEFAULT_PARTICIPANT_ROLE.to_string());
        self.title = details.title;
        self.notes = details.notes;
        self.updated_at = now;
    }
}
