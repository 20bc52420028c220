//! Configuration for the signing engine

use crate::error::{SigningError, SigningResult};
use chrono::Duration;
use cosign_types::DEFAULT_PARTICIPANT_ROLE;
use serde::{Deserialize, Serialize};

/// Fewest random bytes a token may carry (128 bits).
pub const MIN_TOKEN_BYTES: usize = 16;

/// Longest a signing token may stay valid (about ten years).
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Signing engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Days a signing token stays valid after issue
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,

    /// Random bytes per token (hex-encoded, so the token is twice as long)
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,

    /// Origin that signing links are built on, e.g. `https://app.example.com`
    #[serde(default = "default_signing_origin")]
    pub signing_origin: String,

    /// Role given to participants added without one
    #[serde(default = "default_role")]
    pub default_role: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: default_token_ttl_days(),
            token_bytes: default_token_bytes(),
            signing_origin: default_signing_origin(),
            default_role: default_role(),
        }
    }
}

fn default_token_ttl_days() -> i64 {
    30
}

fn default_token_bytes() -> usize {
    32
}

fn default_signing_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_role() -> String {
    DEFAULT_PARTICIPANT_ROLE.to_string()
}

impl SigningConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.signing_origin = origin.into();
        self
    }

    pub fn token_ttl(&self) -> SigningResult<Duration> {
        Duration::try_days(self.token_ttl_days).ok_or_else(|| {
            SigningError::Config(format!(
                "token_ttl_days {} is out of range",
                self.token_ttl_days
            ))
        })
    }

    pub fn validate(&self) -> SigningResult<()> {
        if self.token_ttl_days <= 0 || self.token_ttl_days > MAX_TOKEN_TTL_DAYS {
            return Err(SigningError::Config(format!(
                "token_ttl_days must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_DAYS, self.token_ttl_days
            )));
        }
        if self.token_bytes < MIN_TOKEN_BYTES {
            return Err(SigningError::Config(format!(
                "token_bytes must be at least {}, got {}",
                MIN_TOKEN_BYTES, self.token_bytes
            )));
        }
        let origin = self.signing_origin.trim();
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(SigningError::Config(format!(
                "signing_origin must be an http(s) origin, got {:?}",
                self.signing_origin
            )));
        }
        if origin.contains('?') || origin.contains('#') {
            return Err(SigningError::Config(
                "signing_origin must not carry a query or fragment".to_string(),
            ));
        }
        if self.default_role.trim().is_empty() {
            return Err(SigningError::Config("default_role must not be empty".to_string()));
        }
        Ok(())
    }
}
