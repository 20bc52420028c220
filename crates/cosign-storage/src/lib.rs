//! Cosign storage abstractions.
//!
//! This crate defines the storage contract for the signing core:
//! - mirrored contract records and their derived execution status
//! - contract participants, written with check-and-set fences
//! - an append-only, hash-linked signing event log
//!
//! Design stance:
//! - Every participant write names the `(status, token_version)` it expects
//!   to replace. A mismatch is a [`StorageError::Conflict`], which is how token
//!   consumption stays single-winner across interleaved requests.
//! - Backends are interchangeable behind the traits; [`memory`] is the
//!   reference implementation.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryCosignStorage;
pub use model::{ParticipantFence, SigningEvent, SigningEventKind, SigningEventRecord};
pub use traits::{ContractStore, CosignStorage, ParticipantStore, QueryWindow, SigningEventStore};
