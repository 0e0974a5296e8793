//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::flood::FloodProfile;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.address is required")]
    MissingServerAddress,
    #[error("identity.nickname is required")]
    MissingNickname,
    #[error("identity.nickname must not contain spaces, got '{0}'")]
    InvalidNickname(String),
    #[error("sasl.enabled requires sasl.username and sasl.password")]
    MissingSaslCredentials,
    #[error("flood.profile '{0}' is unknown (expected \"restrictive\" or \"unlimited\")")]
    UnknownFloodProfile(String),
    #[error("connection.keepalive_secs must be greater than zero")]
    ZeroKeepalive,
    #[error("connection.dial_timeout_secs must be greater than zero")]
    ZeroDialTimeout,
    #[error("connection.nick_probe_secs must be greater than zero")]
    ZeroNickProbe,
    #[error("bot.channels entry '{0}' is not a channel name")]
    InvalidChannel(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Required fields
    if config.server.address.trim().is_empty() {
        errors.push(ValidationError::MissingServerAddress);
    }
    let nick = &config.identity.nickname;
    if nick.is_empty() {
        errors.push(ValidationError::MissingNickname);
    } else if nick.contains(char::is_whitespace) {
        errors.push(ValidationError::InvalidNickname(nick.clone()));
    }

    if config.sasl.enabled && (config.sasl.username.is_empty() || config.sasl.password.is_empty())
    {
        errors.push(ValidationError::MissingSaslCredentials);
    }

    if FloodProfile::from_name(&config.flood.profile).is_none() {
        errors.push(ValidationError::UnknownFloodProfile(config.flood.profile.clone()));
    }

    if config.connection.keepalive_secs == 0 {
        errors.push(ValidationError::ZeroKeepalive);
    }
    if config.connection.dial_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDialTimeout);
    }
    if config.connection.nick_probe_secs == 0 {
        errors.push(ValidationError::ZeroNickProbe);
    }

    for channel in &config.bot.channels {
        if !channel.starts_with(['#', '&', '+', '!']) || channel.contains([' ', ',']) {
            errors.push(ValidationError::InvalidChannel(channel.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = parse(
            r##"
[server]
address = "irc.test:6697"
[identity]
nickname = "tether"
[bot]
channels = ["#rust", "&local"]
"##,
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let config = parse(
            r##"
[server]
address = ""
[identity]
nickname = "two words"
[sasl]
enabled = true
username = "account"
[flood]
profile = "bursty"
[connection]
keepalive_secs = 0
[bot]
channels = ["rust"]
"##,
        );
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(matches!(errors[0], ValidationError::MissingServerAddress));
        assert!(matches!(errors[1], ValidationError::InvalidNickname(_)));
        assert!(matches!(errors[2], ValidationError::MissingSaslCredentials));
        assert!(matches!(errors[3], ValidationError::UnknownFloodProfile(_)));
        assert!(matches!(errors[4], ValidationError::ZeroKeepalive));
        assert!(matches!(errors[5], ValidationError::InvalidChannel(_)));
    }

    #[test]
    fn zero_dial_timeout_is_rejected() {
        let config = parse(
            r#"
[server]
address = "irc.test"
[identity]
nickname = "tether"
[connection]
dial_timeout_secs = 0
"#,
        );
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::ZeroDialTimeout]));
    }

    #[test]
    fn zero_nick_probe_is_rejected() {
        let config = parse(
            r#"
[server]
address = "irc.test"
[identity]
nickname = "tether"
[connection]
nick_probe_secs = 0
"#,
        );
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::ZeroNickProbe]));
        assert!(
            Config::from_toml(
                "[server]\naddress = \"irc.test\"\n[identity]\nnickname = \"t\"\n[connection]\nnick_probe_secs = 0\n"
            )
            .is_err()
        );
    }

    #[test]
    fn empty_nickname_is_missing() {
        let config = parse(
            r#"
[server]
address = "irc.test"
[identity]
nickname = ""
"#,
        );
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::MissingNickname]));
    }

    #[test]
    fn load_reports_validation_errors() {
        let err = Config::from_toml(
            r#"
[server]
address = "irc.test"
[identity]
nickname = "tether"
[flood]
profile = "bursty"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref e) if e.len() == 1));
        assert!(err.to_string().contains("bursty"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(
            &path,
            "[server]\naddress = \"irc.test:6667\"\ntls = false\n[identity]\nnickname = \"bot\"\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert!(!config.server.tls);

        let missing = Config::load(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
