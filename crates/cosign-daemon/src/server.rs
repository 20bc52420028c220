//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::router::RouterOptions;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::mailer::build_mailer;
use cosign_engine::{SigningService, SystemClock};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Cosign daemon server
pub struct Server {
    config: DaemonConfig,
    service: SigningService,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let mailer = build_mailer(&config.mailer)?;
        let service =
            SigningService::in_memory(mailer, Arc::new(SystemClock), config.signing.clone())?;

        Ok(Self { config, service })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let app = create_router(
            AppState::new(self.service),
            RouterOptions {
                enable_cors: self.config.server.enable_cors,
                max_body_size: self.config.server.max_body_size,
            },
        );

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("cosign daemon listening on {}", addr);
        tracing::info!(
            signing_origin = %self.config.signing.signing_origin,
            token_ttl_days = self.config.signing.token_ttl_days,
            "Signing links configured"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("cosign daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
