//! Token Issuer: opaque, expiring signing credentials.
//!
//! A token is `token_bytes` of OS randomness, hex-encoded so it can sit in a
//! URL path segment untouched. Every issue bumps the participant's
//! `token_version`; a write only lands if the version it was minted against
//! is still current, so the previous token stops working the moment the new
//! one is stored.

use crate::config::MIN_TOKEN_BYTES;
use crate::context::SigningContext;
use crate::error::{SigningError, SigningResult};
use chrono::{DateTime, Utc};
use cosign_storage::{ParticipantFence, ParticipantStore, SigningEvent, SigningEventKind};
use cosign_types::{
    Participant, ParticipantId, ParticipantStatus, SigningCredential, SigningToken, TokenGrant,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;
use tracing::{info, warn};

/// Draw a fresh token of at least [`MIN_TOKEN_BYTES`] random bytes.
pub fn generate_token(bytes: usize) -> SigningToken {
    let mut buf = vec![0u8; bytes.max(MIN_TOKEN_BYTES)];
    OsRng.fill_bytes(&mut buf);
    SigningToken::new(hex::encode(buf))
}

/// Mints and installs signing credentials.
#[derive(Clone)]
pub struct TokenIssuer {
    ctx: SigningContext,
}

impl TokenIssuer {
    pub fn new(ctx: SigningContext) -> Self {
        Self { ctx }
    }

    /// Mint the next credential for `participant` without writing it.
    pub fn mint_for(&self, participant: &Participant) -> SigningResult<SigningCredential> {
        if participant.is_terminal() {
            return Err(SigningError::InvalidState(format!(
                "participant {} is {}; a completed party cannot be issued a signing link",
                participant.id, participant.status
            )));
        }

        let issued_at = self.ctx.now();
        let expires_at = issued_at
            .checked_add_signed(self.ctx.config.token_ttl()?)
            .ok_or_else(|| {
                SigningError::Config(format!(
                    "token expiry overflows for a {} day lifetime",
                    self.ctx.config.token_ttl_days
                ))
            })?;
        Ok(SigningCredential {
            token: generate_token(self.ctx.config.token_bytes),
            issued_at,
            expires_at,
            version: participant.token_version + 1,
        })
    }

    /// Rotate the credential of an already-invited participant.
    ///
    /// The previous token, if any, is invalid once this returns. A `pending`
    /// participant is refused: its first token comes with the invitation.
    pub async fn issue(
        &self,
        participant_id: &ParticipantId,
        actor: &str,
    ) -> SigningResult<TokenGrant> {
        let current = self.ctx.participant(participant_id).await?;
        if current.status == ParticipantStatus::Pending {
            warn!(
                participant_id = %participant_id,
                "Refusing to issue a token before the first invitation"
            );
            return Err(SigningError::InvalidState(format!(
                "participant {} has not been invited yet",
                participant_id
            )));
        }

        let credential = self.mint_for(&current)?;
        let fence = ParticipantFence::of(&current);
        let mut next = current;
        install(&mut next, &credential, credential.issued_at);

        let stored = self
            .ctx
            .storage
            .replace_participant(fence, next)
            .await
            .map_err(|e| SigningError::from_participant_write(e, *participant_id))?;

        self.ctx
            .record(
                SigningEvent::participant(
                    &stored,
                    SigningEventKind::TokenIssued,
                    actor,
                    credential.issued_at,
                )
                .with_payload(token_payload(&credential)),
            )
            .await;

        info!(
            participant_id = %participant_id,
            version = credential.version,
            fingerprint = %credential.token.fingerprint(),
            "Signing token issued"
        );

        Ok(TokenGrant::from_credential(stored.id, &credential))
    }
}

/// Place `credential` on `participant` as its only live token.
pub(crate) fn install(
    participant: &mut Participant,
    credential: &SigningCredential,
    now: DateTime<Utc>,
) {
    participant.token_version = credential.version;
    participant.credential = Some(credential.clone());
    participant.updated_at = now;
}

/// Audit payload for a credential. Never carries the token itself.
pub(crate) fn token_payload(credential: &SigningCredential) -> serde_json::Value {
    json!({
        "fingerprint": credential.token.fingerprint(),
        "version": credential.version,
        "expires_at": credential.expires_at,
    })
}
