//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use cosign_engine::SIGNING_PATH;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Router options taken from the server configuration
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub enable_cors: bool,
    pub max_body_size: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            enable_cors: true,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Create the main API router
pub fn create_router(state: AppState, options: RouterOptions) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Contracts
        .route(
            "/contracts",
            get(handlers::list_contracts).post(handlers::register_contract),
        )
        .route("/contracts/:id", get(handlers::get_contract))
        .route(
            "/contracts/:id/primary/request",
            post(handlers::request_primary_signature),
        )
        .route(
            "/contracts/:id/primary/sign",
            post(handlers::record_primary_signature),
        )
        .route("/contracts/:id/void", post(handlers::void_contract))
        .route("/contracts/:id/report", get(handlers::contract_report))
        .route("/contracts/:id/events", get(handlers::contract_events))
        // Participants
        .route(
            "/contracts/:id/participants",
            get(handlers::list_participants).post(handlers::add_participant),
        )
        .route(
            "/participants/:id",
            get(handlers::get_participant)
                .put(handlers::update_participant)
                .delete(handlers::remove_participant),
        )
        .route("/participants/:id/invite", post(handlers::send_invite))
        .route("/participants/:id/reissue", post(handlers::reissue_token))
        .route("/participants/:id/link", get(handlers::get_signing_link))
        .route("/participants/:id/waive", post(handlers::waive_decline));

    let signing_routes = Router::new()
        .route("/:token", get(handlers::validate_signing_link))
        .route("/:token/open", post(handlers::open_signing_link))
        .route("/:token/sign", post(handlers::submit_signature))
        .route("/:token/decline", post(handlers::submit_decline));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest(&format!("/{}", SIGNING_PATH), signing_routes)
        .layer(DefaultBodyLimit::max(options.max_body_size))
        .layer(TraceLayer::new_for_http());

    if options.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
