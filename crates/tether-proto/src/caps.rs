//! IRCv3 capability tokens and `CAP` subcommands.
//!
//! Servers advertise capabilities as space-separated tokens, each either a
//! bare name (`account-notify`) or `name=value` (`sasl=PLAIN,EXTERNAL`). Only
//! the first `=` separates name from value; the value itself may contain
//! further `=` characters (`sts=duration=2765100,port=6697`).
//!
//! # Reference
//! - IRCv3 capability negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::HashMap;
use std::fmt;

/// Capability negotiation version requested with `CAP LS`.
pub const CAP_LS_VERSION: &str = "302";

/// One capability as advertised by the server, plus request bookkeeping.
///
/// `acked` and `awaiting_ack` are never both set: a request marks the
/// capability as awaiting; ACK clears awaiting and sets acked; NAK and DEL
/// clear both.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    /// Capability name, including any vendor prefix (`draft/chathistory`).
    pub name: String,
    /// Advertised value, empty when the token had none.
    pub value: String,
    /// The server acknowledged our request.
    pub acked: bool,
    /// A request was sent and no ACK/NAK has arrived yet.
    pub awaiting_ack: bool,
}

impl Capability {
    /// Create an un-negotiated capability.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            acked: false,
            awaiting_ack: false,
        }
    }

    /// Whether the capability is currently enabled on the connection.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.acked && !self.awaiting_ack
    }

    /// Comma-separated entries of the value (`sasl=PLAIN,EXTERNAL`).
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.value.split(',').filter(|v| !v.is_empty())
    }
}

/// Parse a single advertised token.
pub fn parse_capability(token: &str) -> Capability {
    match token.split_once('=') {
        Some((name, value)) => Capability::new(name, value),
        None => Capability::new(token, ""),
    }
}

/// Parse several tokens into a map keyed by capability name.
///
/// Empty tokens (from doubled spaces) are skipped.
pub fn parse_capabilities<'a, I>(tokens: I) -> HashMap<String, Capability>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(parse_capability)
        .map(|cap| (cap.name.clone(), cap))
        .collect()
}

/// `CAP` subcommands as seen by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapSubCommand {
    /// Capability listing.
    Ls,
    /// Enabled capability listing.
    List,
    /// Client request.
    Req,
    /// Server acknowledgement.
    Ack,
    /// Server refusal.
    Nak,
    /// Server advertises new capabilities (cap-notify).
    New,
    /// Server withdraws capabilities (cap-notify).
    Del,
    /// Client ends negotiation.
    End,
    /// Anything else.
    Unknown(String),
}

impl CapSubCommand {
    /// Parse a subcommand, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "LS" => Self::Ls,
            "LIST" => Self::List,
            "REQ" => Self::Req,
            "ACK" => Self::Ack,
            "NAK" => Self::Nak,
            "NEW" => Self::New,
            "DEL" => Self::Del,
            "END" => Self::End,
            _ => Self::Unknown(s.to_owned()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ls => "LS",
            Self::List => "LIST",
            Self::Req => "REQ",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::New => "NEW",
            Self::Del => "DEL",
            Self::End => "END",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CapSubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
