//! Cosign daemon library
//!
//! This module provides the components of `cosignd`:
//! - REST handlers for contracts and participants
//! - Public `/sign-contract/{token}` signing endpoints
//! - Mailer adapters for invitation delivery
//! - Configuration and server lifecycle

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod config;
pub mod error;
pub mod mailer;
pub mod server;

pub use api::create_router;
pub use api::rest::router::RouterOptions;
pub use api::rest::state::AppState;
pub use config::{DaemonConfig, LoggingConfig, MailerConfig, ServerConfig};
pub use error::{ApiError, ApiResult, DaemonError, DaemonResult};
pub use mailer::{build_mailer, LogMailer, WebhookMailer};
pub use server::Server;
