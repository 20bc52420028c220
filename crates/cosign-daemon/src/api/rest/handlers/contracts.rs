//! Contract handlers
//!
//! The contract itself is owned elsewhere; these endpoints mirror it and
//! let the owning system report primary-signature and void changes.

use super::{actor_or_admin, parse_contract_id, ActorBody, WindowQuery};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use cosign_engine::{ContractRegistration, ExecutionReport};
use cosign_storage::SigningEventRecord;
use cosign_types::ContractRecord;
use serde::Deserialize;

/// Register contract request
#[derive(Debug, Deserialize)]
pub struct RegisterContractRequest {
    #[serde(flatten)]
    pub registration: ContractRegistration,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Register a contract
pub async fn register_contract(
    State(state): State<AppState>,
    Json(request): Json<RegisterContractRequest>,
) -> ApiResult<(StatusCode, Json<ContractRecord>)> {
    let actor = actor_or_admin(request.actor.as_deref()).to_string();
    let contract = state
        .service
        .register_contract(request.registration, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

/// List contracts, newest first
pub async fn list_contracts(
    State(state): State<AppState>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<Json<Vec<ContractRecord>>> {
    let contracts = state.service.list_contracts(window.into()).await?;
    Ok(Json(contracts))
}

/// Get a specific contract
pub async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContractRecord>> {
    let contract_id = parse_contract_id(&id)?;
    Ok(Json(state.service.get_contract(&contract_id).await?))
}

/// Primary counterparty has been asked to sign
pub async fn request_primary_signature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<Json<ExecutionReport>> {
    let contract_id = parse_contract_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let report = state
        .service
        .request_primary_signature(&contract_id, body.actor())
        .await?;
    Ok(Json(report))
}

/// Primary counterparty has signed
pub async fn record_primary_signature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<Json<ExecutionReport>> {
    let contract_id = parse_contract_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let report = state
        .service
        .record_primary_signature(&contract_id, body.actor())
        .await?;
    Ok(Json(report))
}

/// Void a contract
pub async fn void_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActorBody>>,
) -> ApiResult<Json<ExecutionReport>> {
    let contract_id = parse_contract_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let report = state
        .service
        .void_contract(&contract_id, body.actor())
        .await?;

    tracing::info!(contract_id = %contract_id, actor = body.actor(), "Contract voided via API");
    Ok(Json(report))
}

/// Execution report: derived status, counts and blocking participants
pub async fn contract_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExecutionReport>> {
    let contract_id = parse_contract_id(&id)?;
    Ok(Json(state.service.report(&contract_id).await?))
}

/// Signing event log of a contract, newest first
pub async fn contract_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<Json<Vec<SigningEventRecord>>> {
    let contract_id = parse_contract_id(&id)?;
    let events = state
        .service
        .events(&contract_id, window.into())
        .await?;
    Ok(Json(events))
}
