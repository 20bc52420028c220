//! Cosign Types - domain types for multi-party contract signing
//!
//! A contract can require signatures from any number of additional
//! participants (witnesses, co-signers, authorized representatives) beyond
//! its primary counterparty. Each participant is invited out-of-band, handed
//! a time-limited signing token, and tracked through an independently paced
//! signing lifecycle.
//!
//! ## Key Concepts
//!
//! - **ContractRecord**: the externally owned contract, mirrored with its
//!   derived execution status
//! - **Participant**: an additional party whose signature the contract needs
//! - **ParticipantStatus**: the per-participant lifecycle
//!   (`pending → sent → viewed → signed | declined`)
//! - **SigningCredential**: the opaque token granting unauthenticated access
//!   to one participation

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod contract;
pub mod ids;
pub mod participant;
pub mod token;

pub use contract::{ContractRecord, ExecutionStatus, PrimarySignature};
pub use ids::{ContractId, IdParseError, ParticipantId};
pub use participant::{
    DeclineRecord, DeclineWaiver, NewParticipant, Participant, ParticipantDetails,
    ParticipantStatus, ParticipantValidationError, SignatureRecord, DEFAULT_PARTICIPANT_ROLE,
    WELL_KNOWN_ROLES,
};
pub use token::{SigningCredential, SigningToken, TokenGrant};
