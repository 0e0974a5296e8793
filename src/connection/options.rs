//! Identity and tuning for a [`crate::Connection`].

use std::fmt;
use std::time::Duration;

use crate::flood::FloodProfile;

/// Capabilities requested when the caller does not choose their own.
pub const DEFAULT_WANTED_CAPS: [&str; 4] = ["echo-message", "message-tags", "multi-prefix", "sasl"];

/// Default idle time before we send a keepalive PING.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(4 * 60);
/// Default connect timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default pause between sending QUIT and closing.
pub const DEFAULT_QUIT_GRACE: Duration = Duration::from_secs(2);
/// Default period of the preferred-nickname reclaim attempt.
pub const DEFAULT_NICK_PROBE_INTERVAL: Duration = Duration::from_secs(60);
/// Default time capability negotiation waits for SASL to finish.
pub const DEFAULT_SASL_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_TLS_PORT: u16 = 6697;
const DEFAULT_PLAIN_PORT: u16 = 6667;

/// Who we are and where we connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port`, `host` or `[v6]:port`.
    pub server: String,
    pub tls: bool,
    /// Server password sent with PASS.
    pub password: Option<String>,
    pub nickname: String,
    pub username: String,
    pub realname: String,
}

impl ClientConfig {
    /// Plaintext client whose username and realname default to `nickname`.
    pub fn new(server: impl Into<String>, nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            server: server.into(),
            tls: false,
            password: None,
            username: nickname.clone(),
            realname: nickname.clone(),
            nickname,
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Host portion of [`Self::server`]. Also the default message source.
    pub fn server_name(&self) -> &str {
        if let Some(rest) = self.server.strip_prefix('[') {
            return rest.split_once(']').map_or(rest, |(host, _)| host);
        }
        match self.server.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
            _ => &self.server,
        }
    }

    /// Address to dial, with the scheme's default port filled in.
    pub fn dial_address(&self) -> String {
        let has_port = if self.server.starts_with('[') {
            self.server.contains("]:")
        } else {
            self.server.matches(':').count() == 1
        };
        if has_port {
            self.server.clone()
        } else {
            let port = if self.tls {
                DEFAULT_TLS_PORT
            } else {
                DEFAULT_PLAIN_PORT
            };
            if self.server.contains(':') && !self.server.starts_with('[') {
                format!("[{}]:{}", self.server, port)
            } else {
                format!("{}:{}", self.server, port)
            }
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("tls", &self.tls)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("nickname", &self.nickname)
            .field("username", &self.username)
            .field("realname", &self.realname)
            .finish()
    }
}

/// SASL PLAIN account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Engine tuning. `Default` gives the stock behaviour.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub keepalive: Duration,
    pub dial_timeout: Duration,
    pub quit_grace: Duration,
    /// Reason attached to QUIT, if any.
    pub quit_message: Option<String>,
    pub nick_probe_interval: Duration,
    pub sasl_timeout: Duration,
    pub flood: FloodProfile,
    pub wanted_caps: Vec<String>,
    /// `None` skips SASL even when the server offers it.
    pub sasl: Option<SaslCredentials>,
    /// Quit on SIGINT/SIGTERM. Disable when embedding the engine in an
    /// application that owns signal handling.
    pub handle_signals: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            quit_grace: DEFAULT_QUIT_GRACE,
            quit_message: None,
            nick_probe_interval: DEFAULT_NICK_PROBE_INTERVAL,
            sasl_timeout: DEFAULT_SASL_TIMEOUT,
            flood: FloodProfile::default(),
            wanted_caps: DEFAULT_WANTED_CAPS.iter().map(|c| c.to_string()).collect(),
            sasl: None,
            handle_signals: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name() {
        assert_eq!(ClientConfig::new("irc.libera.chat:6697", "n").server_name(), "irc.libera.chat");
        assert_eq!(ClientConfig::new("irc.libera.chat", "n").server_name(), "irc.libera.chat");
        assert_eq!(ClientConfig::new("[::1]:6667", "n").server_name(), "::1");
        assert_eq!(ClientConfig::new("::1", "n").server_name(), "::1");
    }

    #[test]
    fn test_dial_address_fills_port() {
        assert_eq!(ClientConfig::new("irc.test:7000", "n").dial_address(), "irc.test:7000");
        assert_eq!(ClientConfig::new("irc.test", "n").dial_address(), "irc.test:6667");
        assert_eq!(
            ClientConfig::new("irc.test", "n").with_tls(true).dial_address(),
            "irc.test:6697"
        );
        assert_eq!(ClientConfig::new("[::1]:7000", "n").dial_address(), "[::1]:7000");
        assert_eq!(ClientConfig::new("::1", "n").dial_address(), "[::1]:6667");
    }

    #[test]
    fn test_identity_defaults_to_nickname() {
        let client = ClientConfig::new("irc.test", "ferris");
        assert_eq!(client.username, "ferris");
        assert_eq!(client.realname, "ferris");
        assert!(!client.tls);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut client = ClientConfig::new("irc.test", "ferris");
        client.password = Some("hunter2".into());
        let creds = SaslCredentials {
            username: "ferris".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{client:?}").contains("hunter2"));
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_default_options() {
        let options = ConnectionOptions::default();
        assert_eq!(options.keepalive, Duration::from_secs(240));
        assert_eq!(options.wanted_caps.len(), 4);
        assert!(options.handle_signals);
        assert!(options.sasl.is_none());
    }
}
