//! # tether-proto
//!
//! The sans-IO half of the tether IRC client: everything that can be
//! expressed as a pure function of bytes and strings.
//!
//! - [`Message`] parsing and serialisation
//! - [`LineCodec`] for newline framing with a bounded line length
//! - IRCv3 capability tokens ([`caps`])
//! - SASL PLAIN encoding and chunking ([`sasl`])
//! - ISUPPORT (005) tokenising ([`isupport`])
//! - numeric reply constants ([`numeric`])
//!
//! ## Parsing a line
//!
//! ```rust
//! use tether_proto::Message;
//!
//! let msg = Message::parse("@time=123 :nick!u@h PRIVMSG #chan :hello world", "irc.example.net")
//!     .expect("well-formed line");
//! assert_eq!(msg.verb, "PRIVMSG");
//! assert_eq!(msg.source, "nick!u@h");
//! assert_eq!(msg.params, vec!["#chan", "hello world"]);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod caps;
pub mod error;
pub mod isupport;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod numeric;
pub mod sasl;

pub use self::caps::{parse_capabilities, parse_capability, CapSubCommand, Capability};
pub use self::error::{ParseError, ProtocolError};
pub use self::isupport::SupportToken;
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::Message;
pub use self::sasl::{chunk_response, encode_plain, SaslMechanism, SASL_CHUNK_SIZE};
