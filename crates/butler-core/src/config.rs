use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Wire protocol version advertised on the staff socket's `connected` frame.
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Guard against pathological payloads before they hit serde.
pub const MAX_MESSAGE_CONTENT_CHARS: usize = 4000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const AUTOMATION_TICK_SECS: u64 = 60;
pub const RETRY_TICK_SECS: u64 = 10;
pub const RETRY_BATCH_SIZE: usize = 10;
pub const RULE_AUTO_DISABLE_CEILING: u32 = 5;

/// Only the small static surface the core reads from environment/file.
/// Everything else (AI/channel/PMS credentials) lives in `extension_configs`
/// and is hot-swappable — see `butler-registry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButlerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ButlerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            webhooks: WebhookConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Per-source webhook secrets (spec §6: "webhook secrets-file path").
/// Channel credentials otherwise live in `extension_configs`, but the
/// webhook signature check happens before any adapter is looked up, so the
/// secret it verifies against is read from this small static surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Twilio-style auth token used to verify `x-twilio-signature`.
    pub sms_auth_token: Option<String>,
    /// Meta/WhatsApp-style verify token used for the webhook subscription
    /// handshake (`hub.verify_token`).
    pub im_verify_token: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally-reachable base URL (no trailing slash), used to
    /// reconstruct the exact URL a webhook provider signed. Defaults to
    /// `http://<bind>:<port>` for local/dev use.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            public_base_url: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs_path(".butler/butler.db")
}

fn dirs_path(suffix: &str) -> String {
    match std::env::var("HOME") {
        Ok(home) => format!("{home}/{suffix}"),
        Err(_) => format!("./{suffix}"),
    }
}

/// Secret used to verify staff access/refresh tokens (HS256 JWTs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
        }
    }
}

fn default_jwt_secret() -> String {
    "dev-insecure-secret-change-me".to_string()
}

impl ButlerConfig {
    /// Layered load: defaults, then an optional TOML file, then
    /// `BUTLER_`-prefixed environment overrides (e.g. `BUTLER_JWT_SECRET`).
    pub fn load(config_path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            ButlerConfig::default(),
        ));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("BUTLER_").split("_"));
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = ButlerConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = ButlerConfig::load(None).expect("defaults must always extract");
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
    }
}
