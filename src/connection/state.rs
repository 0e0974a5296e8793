//! Connection lifecycle states.

use std::fmt;

/// Where a [`crate::Connection`] is in its lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> Handshaking -> Registered -> Running
///                                    |             |           |
///                                    +-------------+-----------+--> Quitting -> Disconnected
/// ```
///
/// Transport failure or server ERROR from any connected state goes straight
/// back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Dialing (and TLS handshake).
    Connecting,
    /// Socket up, CAP/NICK/USER in flight.
    Handshaking,
    /// The server sent 001.
    Registered,
    /// Welcome burst finished.
    Running,
    /// QUIT sent, waiting out the grace period.
    Quitting,
}

impl ConnectionState {
    /// A session exists in this state.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Handshaking | Self::Registered | Self::Running | Self::Quitting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Quitting => "quitting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
