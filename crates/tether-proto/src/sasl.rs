//! SASL PLAIN helpers for IRC.
//!
//! The IRC SASL extension carries base64 payloads in `AUTHENTICATE` lines of
//! at most [`SASL_CHUNK_SIZE`] characters. A payload whose final chunk is
//! exactly that long must be followed by `AUTHENTICATE +` so the server knows
//! nothing more is coming.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.1>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single `AUTHENTICATE` payload chunk.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Payload sent by either side to mean "empty" or "continue".
pub const SASL_EMPTY: &str = "+";

/// SASL mechanisms a server may advertise.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SaslMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// EXTERNAL (TLS client certificate).
    External,
    /// SCRAM-SHA-256 (RFC 7677).
    ScramSha256,
    /// Anything else.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            "SCRAM-SHA-256" => Self::ScramSha256,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a comma-separated mechanism list, as found in the `sasl`
/// capability value or `RPL_SASLMECHS` (908).
pub fn parse_mechanisms(list: &str) -> Vec<SaslMechanism> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SaslMechanism::parse)
        .collect()
}

/// Encode PLAIN credentials as `authzid NUL authcid NUL password`.
///
/// Both identities are set to `username`, which is what IRC services
/// expect when logging in to one's own account.
pub fn encode_plain(username: &str, password: &str) -> String {
    encode_plain_with_authzid(username, username, password)
}

/// Encode PLAIN credentials with distinct authorization and authentication
/// identities.
pub fn encode_plain_with_authzid(authzid: &str, authcid: &str, password: &str) -> String {
    let payload = format!("{}\0{}\0{}", authzid, authcid, password);
    BASE64.encode(payload.as_bytes())
}

/// Split an encoded payload into `AUTHENTICATE` chunks.
///
/// Returns every line payload to send, in order, including the trailing
/// `+` when the final chunk is exactly [`SASL_CHUNK_SIZE`] long (or the
/// payload is empty).
pub fn chunk_response(encoded: &str) -> Vec<&str> {
    let mut chunks: Vec<&str> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        // base64 output is ASCII, so every byte boundary is a char boundary
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    if chunks.last().is_none_or(|last| last.len() == SASL_CHUNK_SIZE) {
        chunks.push(SASL_EMPTY);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain_repeats_identity() {
        let encoded = encode_plain("user", "pass");
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"user\0user\0pass");
    }

    #[test]
    fn test_encode_plain_with_authzid() {
        let encoded = encode_plain_with_authzid("", "user", "pass");
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn test_chunk_short() {
        assert_eq!(chunk_response("abc123"), vec!["abc123"]);
    }

    #[test]
    fn test_chunk_long() {
        let long = "a".repeat(500);
        let chunks = chunk_response(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1].len(), 100);
    }

    #[test]
    fn test_chunk_exact_multiple_adds_terminator() {
        let exact = "b".repeat(800);
        let chunks = chunk_response(&exact);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1].len(), 400);
        assert_eq!(chunks[2], "+");
    }

    #[test]
    fn test_chunk_empty_payload() {
        assert_eq!(chunk_response(""), vec!["+"]);
    }

    #[test]
    fn test_parse_mechanisms() {
        let mechs = parse_mechanisms("PLAIN, external,SCRAM-SHA-256,,FOO");
        assert_eq!(
            mechs,
            vec![
                SaslMechanism::Plain,
                SaslMechanism::External,
                SaslMechanism::ScramSha256,
                SaslMechanism::Unknown("FOO".to_owned()),
            ]
        );
    }

    #[test]
    fn test_mechanism_as_str() {
        assert_eq!(SaslMechanism::Plain.as_str(), "PLAIN");
        assert_eq!(SaslMechanism::parse("plain").to_string(), "PLAIN");
    }
}
