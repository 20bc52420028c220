//! Public signing-link handlers
//!
//! Reachable without authentication: the token in the path is the only
//! credential. Responses never echo the token or admin-only fields.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use cosign_engine::{SignatureSubmission, SigningSession};
use cosign_types::{Participant, ParticipantStatus, SigningToken};
use serde::{Deserialize, Serialize};

/// What the signer sees after opening the link
#[derive(Debug, Serialize)]
pub struct SigningPageView {
    pub contract_number: String,
    pub participant_name: String,
    pub role: String,
    pub title: Option<String>,
    pub status: ParticipantStatus,
    pub expires_at: DateTime<Utc>,
}

impl From<SigningSession> for SigningPageView {
    fn from(session: SigningSession) -> Self {
        Self {
            contract_number: session.contract_number,
            participant_name: session.participant.name,
            role: session.participant.role,
            title: session.participant.title,
            status: session.participant.status,
            expires_at: session.expires_at,
        }
    }
}

/// Outcome of a sign or decline submission
#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub status: ParticipantStatus,
    pub recorded_at: DateTime<Utc>,
}

impl From<Participant> for SubmissionReceipt {
    fn from(p: Participant) -> Self {
        let recorded_at = p
            .signature
            .as_ref()
            .map(|s| s.signed_at)
            .or_else(|| p.decline.as_ref().map(|d| d.declined_at))
            .unwrap_or(p.updated_at);
        Self {
            status: p.status,
            recorded_at,
        }
    }
}

/// Decline request
#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

fn token_from(raw: &str) -> ApiResult<SigningToken> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("signing token is missing".to_string()));
    }
    Ok(SigningToken::new(raw))
}

/// Show a signing link without changing anything
///
/// Link scanners and previews fetch this freely, so it only validates.
pub async fn validate_signing_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<SigningPageView>> {
    let token = token_from(&token)?;
    let session = state.service.machine().validate(&token).await?;
    Ok(Json(session.into()))
}

/// Record that the signer opened the link; the participant becomes viewed
pub async fn open_signing_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<SigningPageView>> {
    let token = token_from(&token)?;
    let session = state.service.machine().open(&token).await?;
    Ok(Json(session.into()))
}

/// Submit a signature
pub async fn submit_signature(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(submission): Json<SignatureSubmission>,
) -> ApiResult<Json<SubmissionReceipt>> {
    let token = token_from(&token)?;
    let participant = state.service.machine().sign(&token, submission).await?;
    Ok(Json(participant.into()))
}

/// Decline to sign
pub async fn submit_decline(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Option<Json<DeclineRequest>>,
) -> ApiResult<Json<SubmissionReceipt>> {
    let token = token_from(&token)?;
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let participant = state
        .service
        .machine()
        .decline(&token, request.reason)
        .await?;
    Ok(Json(participant.into()))
}
