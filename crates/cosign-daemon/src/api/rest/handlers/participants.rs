//! Participant management handlers (admin surface)

use super::{actor_or_admin, parse_contract_id, parse_participant_id, ActorBody};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use cosign_engine::SigningLink;
use cosign_types::{
    ContractId, DeclineRecord, NewParticipant, Participant, ParticipantDetails, ParticipantId,
    ParticipantStatus, SignatureRecord,
};
use serde::{Deserialize, Serialize};

/// Participant as shown to admins. The raw token is never included; use
/// the link endpoint to obtain a shareable URL.
#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub contract_id: ContractId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub status: ParticipantStatus,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub signature: Option<SignatureRecord>,
    pub decline: Option<DeclineRecord>,
    pub blocks_execution: bool,
    pub display_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Participant> for ParticipantView {
    fn from(p: Participant) -> Self {
        let blocks_execution = p.blocks_execution();
        Self {
            id: p.id,
            contract_id: p.contract_id,
            name: p.name,
            email: p.email,
            phone: p.phone,
            role: p.role,
            title: p.title,
            notes: p.notes,
            status: p.status,
            token_expires_at: p.credential.map(|c| c.expires_at),
            sent_at: p.sent_at,
            viewed_at: p.viewed_at,
            signature: p.signature,
            decline: p.decline,
            blocks_execution,
            display_order: p.display_order,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Add or edit participant request
#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    #[serde(flatten)]
    pub details: NewParticipant,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Shareable signing link
#[derive(Debug, Serialize)]
pub struct SigningLinkResponse {
    pub participant_id: ParticipantId,
    pub signing_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Invitation response
#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub participant: ParticipantView,
    pub signing_url: String,
    pub expires_at: DateTime<Utc>,
    pub message_id: Option<String>,
}

/// Waive decline request
#[derive(Debug, Default, Deserialize)]
pub struct WaiveDeclineRequest {
    #[serde(default)]
    pub waived_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Add a participant to a contract
pub async fn add_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ParticipantRequest>,
) -> ApiResult<(StatusCode, Json<ParticipantView>)> {
    let contract_id = parse_contract_id(&id)?;
    let actor = actor_or_admin(request.actor.as_deref()).to_string();
    let participant = state
        .service
        .registry()
        .add(&contract_id, request.details, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(participant.into())))
}

/// List a contract's participants in display order
pub async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ParticipantView>>> {
    let contract_id = parse_contract_id(&id)?;
    let participants = state.service.registry().list(&contract_id).await?;
    Ok(Json(participants.into_iter().map(Into::into).collect()))
}

/// Get a specific participant
pub async fn get_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ParticipantView>> {
    let participant_id = parse_participant_id(&id)?;
    let participant = state.service.registry().get(&participant_id).await?;
    Ok(Json(participant.into()))
}

/// Replace a participant's editable details
pub async fn update_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ParticipantRequest>,
) -> ApiResult<Json<ParticipantView>> {
    let participant_id = parse_participant_id(&id)?;
    let actor = actor_or_admin(request.actor.as_deref()).to_string();
    let details: ParticipantDetails = request.details;
    let participant = state
        .service
        .registry()
        .update_details(&participant_id, details, &actor)
        .await?;
    Ok(Json(participant.into()))
}

/// Remove a participant that has not signed
pub async fn remove_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<StatusCode> {
    let participant_id = parse_participant_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    state
        .service
        .registry()
        .remove(&participant_id, body.actor())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send, or resend, the signing invitation
pub async fn send_invite(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<Json<InviteResponse>> {
    let participant_id = parse_participant_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .service
        .dispatcher()
        .send_invite(&participant_id, body.actor())
        .await?;

    Ok(Json(InviteResponse {
        expires_at: outcome.grant.expires_at,
        signing_url: outcome.signing_url.into_string(),
        message_id: outcome.receipt.message_id,
        participant: outcome.participant.into(),
    }))
}

/// Mint a fresh token without sending mail, for manual sharing
pub async fn reissue_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<Json<SigningLinkResponse>> {
    let participant_id = parse_participant_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let grant = state
        .service
        .issuer()
        .issue(&participant_id, body.actor())
        .await?;
    let link = SigningLink::build(&state.service.config().signing_origin, &grant.token);

    Ok(Json(SigningLinkResponse {
        participant_id,
        signing_url: link.into_string(),
        expires_at: Some(grant.expires_at),
    }))
}

/// Current signing link, if the participant holds a live token
pub async fn get_signing_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SigningLinkResponse>> {
    let participant_id = parse_participant_id(&id)?;
    let link = state
        .service
        .machine()
        .signing_link(&participant_id)
        .await?;

    Ok(Json(SigningLinkResponse {
        participant_id,
        signing_url: link.into_string(),
        expires_at: None,
    }))
}

/// Administrative override: a declined participant stops blocking execution
pub async fn waive_decline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<WaiveDeclineRequest>>,
) -> ApiResult<Json<ParticipantView>> {
    let participant_id = parse_participant_id(&id)?;
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let waived_by = actor_or_admin(request.waived_by.as_deref()).to_string();
    let participant = state
        .service
        .registry()
        .waive_decline(&participant_id, &waived_by, request.reason)
        .await?;
    Ok(Json(participant.into()))
}
