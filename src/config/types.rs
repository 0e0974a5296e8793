//! Core configuration types.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::defaults::*;
use super::validation::{self, ValidationError};
use crate::connection::{ClientConfig, ConnectionOptions, SaslCredentials};
use crate::flood::FloodProfile;
use crate::telemetry::LogFormat;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wire-level debug logging; raises the default level to `debug`.
    #[serde(default)]
    pub debug: bool,
    /// Server to connect to.
    pub server: ServerConfig,
    /// Who we are on the network.
    pub identity: IdentityConfig,
    /// SASL account login.
    #[serde(default)]
    pub sasl: SaslConfig,
    /// Outbound flood control.
    #[serde(default)]
    pub flood: FloodConfig,
    /// Engine timings, retries and capabilities.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
    /// Bot behaviour.
    #[serde(default)]
    pub bot: BotConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Run every startup check, reporting all failures together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self).map_err(ConfigError::Invalid)
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &str {
        if self.debug { "debug" } else { &self.log.level }
    }

    /// Identity and server for the connection engine.
    pub fn client_config(&self) -> ClientConfig {
        let nickname = self.identity.nickname.clone();
        ClientConfig {
            server: self.server.address.clone(),
            tls: self.server.tls,
            password: self.server.password.clone().filter(|p| !p.is_empty()),
            username: self
                .identity
                .username
                .clone()
                .unwrap_or_else(|| nickname.clone()),
            realname: self.identity.realname.clone(),
            nickname,
        }
    }

    /// Engine tuning. Validation guarantees the flood profile name resolves.
    pub fn connection_options(&self) -> ConnectionOptions {
        let sasl = self.sasl.enabled.then(|| SaslCredentials {
            username: self.sasl.username.clone(),
            password: self.sasl.password.clone(),
        });
        ConnectionOptions {
            keepalive: Duration::from_secs(self.connection.keepalive_secs),
            dial_timeout: Duration::from_secs(self.connection.dial_timeout_secs),
            quit_grace: Duration::from_secs(self.connection.quit_grace_secs),
            quit_message: self.connection.quit_message.clone(),
            nick_probe_interval: Duration::from_secs(self.connection.nick_probe_secs),
            sasl_timeout: Duration::from_secs(self.connection.sasl_timeout_secs),
            flood: FloodProfile::from_name(&self.flood.profile).unwrap_or_default(),
            wanted_caps: self.connection.wanted_caps.clone(),
            sasl,
            handle_signals: true,
        }
    }
}

/// Server address configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` (e.g., "irc.libera.chat:6697").
    pub address: String,
    /// Connect with TLS (default: true).
    #[serde(default = "default_true")]
    pub tls: bool,
    /// Server password sent with PASS (optional).
    pub password: Option<String>,
}

/// Identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub nickname: String,
    /// Defaults to the nickname.
    pub username: Option<String>,
    #[serde(default = "default_realname")]
    pub realname: String,
}

/// SASL configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaslConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Flood control configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FloodConfig {
    /// "restrictive" or "unlimited".
    #[serde(default = "default_flood_profile")]
    pub profile: String,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            profile: default_flood_profile(),
        }
    }
}

/// Connection engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Idle seconds before a keepalive PING (default: 240).
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Connect timeout (default: 60).
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Pause between QUIT and close (default: 2).
    #[serde(default = "default_quit_grace_secs")]
    pub quit_grace_secs: u64,
    #[serde(default)]
    pub quit_message: Option<String>,
    /// Preferred-nickname reclaim period (default: 60).
    #[serde(default = "default_nick_probe_secs")]
    pub nick_probe_secs: u64,
    /// How long negotiation waits for SASL (default: 5).
    #[serde(default = "default_sasl_timeout_secs")]
    pub sasl_timeout_secs: u64,
    /// Reconnect attempts before giving up (default: 10).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_wanted_caps")]
    pub wanted_caps: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            quit_grace_secs: default_quit_grace_secs(),
            quit_message: None,
            nick_probe_secs: default_nick_probe_secs(),
            sasl_timeout_secs: default_sasl_timeout_secs(),
            max_retries: default_max_retries(),
            wanted_caps: default_wanted_caps(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl LogConfig {
    pub fn log_format(&self) -> LogFormat {
        if self.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Bot behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    /// Channels joined after registration.
    #[serde(default)]
    pub channels: Vec<String>,
}
