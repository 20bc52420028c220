//! API request handlers

mod contracts;
mod health;
mod participants;
mod signing;

pub use contracts::*;
pub use health::*;
pub use participants::*;
pub use signing::*;

use crate::error::{ApiError, ApiResult};
use cosign_storage::QueryWindow;
use cosign_types::{ContractId, ParticipantId};
use serde::Deserialize;

/// Actor recorded on admin writes when the caller names none.
pub(crate) const ADMIN_ACTOR: &str = "admin";

/// Paging query for list endpoints
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl From<WindowQuery> for QueryWindow {
    fn from(query: WindowQuery) -> Self {
        QueryWindow {
            limit: query.limit.min(500),
            offset: query.offset,
        }
    }
}

/// Optional actor override carried in admin request bodies.
#[derive(Debug, Default, Deserialize)]
pub struct ActorBody {
    #[serde(default)]
    pub actor: Option<String>,
}

impl ActorBody {
    pub(crate) fn actor(&self) -> &str {
        actor_or_admin(self.actor.as_deref())
    }
}

pub(crate) fn actor_or_admin(actor: Option<&str>) -> &str {
    actor
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(ADMIN_ACTOR)
}

pub(crate) fn parse_contract_id(id: &str) -> ApiResult<ContractId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid contract ID: {}", id)))
}

pub(crate) fn parse_participant_id(id: &str) -> ApiResult<ParticipantId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid participant ID: {}", id)))
}
