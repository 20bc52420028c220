//! Cosign Engine - how a contract acquires the signatures of all its parties.
//!
//! Every additional participant on a contract moves through its own
//! lifecycle, independently of the others:
//!
//! ```text
//! pending ──invite──▶ sent ──open──▶ viewed ──sign─────▶ signed
//!                      │  ▲                 └──decline──▶ declined
//!           delivery   ▼  │ resend
//!           failure   send_failed
//! ```
//!
//! A resend from `viewed` returns the participant to `sent`; a `send_failed`
//! participant can still open a link the admin shared by hand. `signed` and
//! `declined` are terminal.
//!
//! ## Components
//!
//! 1. **Token Issuer** ([`TokenIssuer`]) mints opaque, expiring credentials
//! 2. **Participant Registry** ([`ParticipantRegistry`]) owns the participant set
//! 3. **Invitation Dispatcher** ([`InvitationDispatcher`]) binds a token and hands
//!    the signing link to the mail collaborator
//! 4. **Participant State Machine** ([`ParticipantStateMachine`]) validates tokens
//!    and applies view / sign / decline as single check-and-set writes
//! 5. **Completion Aggregator** ([`CompletionAggregator`]) derives the contract's
//!    execution status from every required signature
//!
//! [`SigningService`] wires them together over one storage backend, clock and
//! configuration.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod machine;
pub mod mocks;
pub mod registry;
pub mod service;
pub mod token;

pub use aggregator::{evaluate, CompletionAggregator, ExecutionReport, StatusCounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SigningConfig;
pub use context::SigningContext;
pub use dispatch::{
    DeliveryError, DeliveryReceipt, EmailDelivery, InvitationDispatcher, InviteMessage,
    InviteOutcome,
};
pub use error::{ErrorKind, SigningError, SigningResult};
pub use link::{SigningLink, SIGNING_PATH};
pub use machine::{ParticipantStateMachine, SignatureSubmission, SigningSession};
pub use mocks::{FailingMailer, RecordingMailer};
pub use registry::ParticipantRegistry;
pub use service::{ContractRegistration, SigningService};
pub use token::{generate_token, TokenIssuer};
