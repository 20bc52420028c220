//! cosignd - multi-party contract signing daemon
//!
//! Serves the admin REST API under `/api/v1` and the public signing links
//! under `/sign-contract/{token}`.

use clap::Parser;
use cosign_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cosign daemon CLI
#[derive(Parser)]
#[command(name = "cosignd")]
#[command(about = "Cosign daemon - multi-party contract signing", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "COSIGN_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the config file
    #[arg(short, long, env = "COSIGN_LISTEN_ADDR")]
    listen: Option<String>,

    /// Public origin signing links are built on
    #[arg(long, env = "COSIGN_SIGNING_ORIGIN")]
    signing_origin: Option<String>,

    /// Log level
    #[arg(long, env = "COSIGN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "COSIGN_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(origin) = cli.signing_origin {
        config.signing = config.signing.with_origin(origin);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    init_tracing(&config);

    let server = Server::new(config)?;
    server.run().await
}

fn init_tracing(config: &DaemonConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
