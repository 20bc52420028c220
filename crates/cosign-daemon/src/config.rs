//! Configuration for cosignd

use cosign_engine::SigningConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token lifetime, signing origin and participant defaults
    #[serde(default)]
    pub signing: SigningConfig,

    /// Invitation delivery
    #[serde(default)]
    pub mailer: MailerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            max_body_size: default_max_body_size(),
        }
    }
}

/// Where invitations go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MailerConfig {
    /// Log the invitation and report it delivered (development)
    #[default]
    Log,

    /// POST each invitation as JSON to an external mail service
    Webhook {
        /// Endpoint URL
        url: String,

        /// Request timeout in seconds
        #[serde(default = "default_webhook_timeout")]
        timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `COSIGN__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("COSIGN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.mailer, MailerConfig::Log));
        assert_eq!(config.signing.token_ttl_days, 30);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.server.max_body_size, 1024 * 1024);
        assert_eq!(config.signing.signing_origin, "http://localhost:3000");
    }

    #[test]
    fn test_webhook_mailer_from_json() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{ "mailer": { "type": "webhook", "url": "http://mail.internal/send" } }"#,
        )
        .unwrap();
        match config.mailer {
            MailerConfig::Webhook { url, timeout_secs } => {
                assert_eq!(url, "http://mail.internal/send");
                assert_eq!(timeout_secs, 10);
            }
            other => panic!("unexpected mailer: {:?}", other),
        }
    }
}
