//! Contracts as seen by the signing core.
//!
//! The contract itself (document, pricing, counterparties) is owned by an
//! external collaborator. The core mirrors only what it needs: the display
//! number, the primary counterparty's signature state, and the derived
//! execution status it is responsible for.

use crate::ContractId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature state of the primary counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrimarySignature {
    /// Contract still being drafted
    #[default]
    NotRequested,
    /// Sent to the primary counterparty
    Awaiting,
    /// Primary counterparty has signed
    Signed,
}

/// Contract-level status derived from every required signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Draft,
    AwaitingSignatures,
    Executed,
    Void,
}

impl ExecutionStatus {
    /// Executed and void contracts no longer accept participant changes.
    pub fn is_closed(&self) -> bool {
        matches!(self, ExecutionStatus::Executed | ExecutionStatus::Void)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Draft => "draft",
            ExecutionStatus::AwaitingSignatures => "awaiting_signatures",
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Void => "void",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirrored contract record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    /// Display identifier, immutable once issued.
    pub contract_number: String,
    pub primary: PrimarySignature,
    pub voided: bool,
    pub execution_status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractRecord {
    pub fn new(contract_number: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ContractId::generate(),
            contract_number: contract_number.into(),
            primary: PrimarySignature::NotRequested,
            voided: false,
            execution_status: ExecutionStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: ContractId) -> Self {
        self.id = id;
        self
    }

    pub fn with_primary(mut self, primary: PrimarySignature) -> Self {
        self.primary = primary;
        self
    }

    pub fn accepts_participant_changes(&self) -> bool {
        !self.voided && !self.execution_status.is_closed()
    }
}
