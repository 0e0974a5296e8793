//! ISUPPORT (`RPL_ISUPPORT`, 005) tokenising.
//!
//! A 005 line looks like
//!
//! ```text
//! :server 005 nick AWAYLEN=500 CHANLIMIT=#:100 -EXCEPTS :are supported by this server
//! ```
//!
//! The first parameter is our nickname and the last is human-readable text;
//! everything in between is a token. A token prefixed with `-` withdraws a
//! previously advertised key.

/// One advertised ISUPPORT token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportToken {
    /// Token key (`CHANLIMIT`).
    pub name: String,
    /// Token value, empty for bare keys (`EXCEPTS`).
    pub value: String,
    /// The token withdraws `name` rather than advertising it.
    pub negated: bool,
}

impl SupportToken {
    /// Parse one token. Returns `None` for empty input or a bare `-`.
    pub fn parse(token: &str) -> Option<Self> {
        let (negated, token) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let (name, value) = token.split_once('=').unwrap_or((token, ""));
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_owned(),
            value: value.to_owned(),
            negated,
        })
    }
}

/// Tokenise the parameters of a 005 reply.
///
/// Skips the leading target nickname and the trailing text parameter.
pub fn tokenise(params: &[String]) -> Vec<SupportToken> {
    if params.len() < 3 {
        return Vec::new();
    }
    params[1..params.len() - 1]
        .iter()
        .filter_map(|p| SupportToken::parse(p))
        .collect()
}
