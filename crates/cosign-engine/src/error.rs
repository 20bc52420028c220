use cosign_storage::StorageError;
use cosign_types::{ContractId, ParticipantId};
use serde::Serialize;
use thiserror::Error;

/// Result type for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;

/// Errors from the signing engine.
///
/// Every error is scoped to one participant or contract.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("participant {0} has no email address to send the signing invitation to")]
    MissingChannel(ParticipantId),

    #[error("signing link is invalid or has expired")]
    TokenExpired,

    #[error("signing link has already been used")]
    TokenAlreadyConsumed,

    #[error("participant {0} has no active signing link; send an invitation first")]
    NoActiveToken(ParticipantId),

    #[error("invitation for participant {participant_id} could not be delivered: {reason}")]
    DeliveryFailed {
        participant_id: ParticipantId,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Flat classification of [`SigningError`] for transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidInput,
    MissingChannel,
    TokenExpired,
    TokenAlreadyConsumed,
    NoActiveToken,
    DeliveryFailed,
    Config,
    Storage,
}

impl SigningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SigningError::ContractNotFound(_) | SigningError::ParticipantNotFound(_) => {
                ErrorKind::NotFound
            }
            SigningError::InvalidState(_) => ErrorKind::InvalidState,
            SigningError::InvalidInput(_) => ErrorKind::InvalidInput,
            SigningError::MissingChannel(_) => ErrorKind::MissingChannel,
            SigningError::TokenExpired => ErrorKind::TokenExpired,
            SigningError::TokenAlreadyConsumed => ErrorKind::TokenAlreadyConsumed,
            SigningError::NoActiveToken(_) => ErrorKind::NoActiveToken,
            SigningError::DeliveryFailed { .. } => ErrorKind::DeliveryFailed,
            SigningError::Config(_) => ErrorKind::Config,
            SigningError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Map a failed participant write onto the engine taxonomy.
    pub(crate) fn from_participant_write(err: StorageError, participant_id: ParticipantId) -> Self {
        match err {
            StorageError::NotFound(_) => SigningError::ParticipantNotFound(participant_id),
            StorageError::Conflict(reason) => SigningError::InvalidState(format!(
                "participant {} changed concurrently: {}",
                participant_id, reason
            )),
            StorageError::InvariantViolation(reason) => SigningError::InvalidState(reason),
            other => SigningError::Storage(other),
        }
    }

    /// Map a failed contract read or write onto the engine taxonomy.
    pub(crate) fn from_contract_write(err: StorageError, contract_id: ContractId) -> Self {
        match err {
            StorageError::NotFound(_) => SigningError::ContractNotFound(contract_id),
            StorageError::InvariantViolation(reason) => SigningError::InvalidState(reason),
            other => SigningError::Storage(other),
        }
    }
}
