//! Signing tokens and the credentials that carry them.
//!
//! A token is an opaque bearer credential: whoever holds it may view, sign or
//! decline one specific participation. It is therefore never printed in
//! `Debug` output; only a short fingerprint is.

use crate::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, URL-safe bearer credential.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningToken(String);

impl SigningToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable blake3 digest, used to remember retired tokens without
    /// keeping them usable.
    pub fn digest(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }

    /// First eight characters of the digest; safe to log.
    pub fn fingerprint(&self) -> String {
        self.digest().chars().take(8).collect()
    }
}

impl fmt::Debug for SigningToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningToken({})", self.fingerprint())
    }
}

/// A live credential attached to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningCredential {
    pub token: SigningToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Matches the participant's `token_version` at the time of issue.
    pub version: u64,
}

impl SigningCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn matches(&self, token: &SigningToken) -> bool {
        self.token == *token
    }
}

/// What the issuer hands back after minting a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub participant_id: ParticipantId,
    pub token: SigningToken,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl TokenGrant {
    pub fn from_credential(participant_id: ParticipantId, credential: &SigningCredential) -> Self {
        Self {
            participant_id,
            token: credential.token.clone(),
            expires_at: credential.expires_at,
            version: credential.version,
        }
    }
}
