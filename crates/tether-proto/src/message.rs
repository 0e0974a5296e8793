//! IRC message type and line parser.
//!
//! A [`Message`] is one protocol line split into its four parts:
//!
//! ```text
//! @tags :source VERB param1 param2 :trailing parameter
//! ```
//!
//! Tags are kept as the raw tag block. The source is the prefix without its
//! leading colon, or a caller-supplied default when the line has no prefix.

use std::fmt;

use crate::error::ParseError;

/// Lines shorter than this (after trimming CR/LF) are never valid frames.
pub const MIN_LINE_LEN: usize = 5;

/// A single parsed protocol line.
///
/// Immutable once built; the engine shares it between handlers behind an
/// `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The line as received, without its terminator.
    pub raw: String,
    /// Raw IRCv3 tag block without the leading `@`.
    pub tags: Option<String>,
    /// Prefix without the leading `:`, or the default source.
    pub source: String,
    /// Uppercased command or numeric.
    pub verb: String,
    /// Ordered parameters; a trailing `:` parameter is the final element.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a raw line.
    ///
    /// `default_source` is used when the line carries no `:prefix`, which
    /// happens for a handful of server-originated lines (`PING`, `ERROR`).
    pub fn parse(line: &str, default_source: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < MIN_LINE_LEN {
            return Err(ParseError::TooShort { len: line.len() });
        }

        let mut rest = line;

        let tags = if let Some(stripped) = rest.strip_prefix('@') {
            let (tags, remainder) = stripped
                .split_once(' ')
                .ok_or(ParseError::UnterminatedTags)?;
            rest = remainder;
            Some(tags.to_owned())
        } else {
            None
        };

        let source = if let Some(stripped) = rest.strip_prefix(':') {
            let (source, remainder) = stripped
                .split_once(' ')
                .ok_or(ParseError::UnterminatedSource)?;
            rest = remainder;
            source.to_owned()
        } else {
            default_source.to_owned()
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let verb = words
            .next()
            .ok_or(ParseError::MissingVerb)?
            .to_ascii_uppercase();

        let mut params: Vec<String> = words.map(str::to_owned).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_owned());
        }

        Ok(Self {
            raw: line.to_owned(),
            tags,
            source,
            verb,
            params,
        })
    }

    /// Parameter at `index`, if present.
    #[inline]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, which is usually the free-text part.
    #[inline]
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// All parameters joined by single spaces.
    pub fn params_string(&self) -> String {
        self.params.join(" ")
    }

    /// The nickname part of the source (`nick` in `nick!user@host`).
    pub fn source_nick(&self) -> &str {
        self.source
            .split(['!', '@'])
            .next()
            .unwrap_or(self.source.as_str())
    }

    /// Look up a tag value. Bare tags (`@draft/bot`) yield `Some("")`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_deref()?.split(';').find_map(|tag| {
            let (k, v) = tag.split_once('=').unwrap_or((tag, ""));
            (k == key).then_some(v)
        })
    }

    /// Whether the verb is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.verb.len() == 3 && self.verb.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = &self.tags {
            write!(f, "@{} ", tags)?;
        }
        if !self.source.is_empty() {
            write!(f, ":{} ", self.source)?;
        }
        f.write_str(&self.verb)?;

        if let Some((last, leading)) = self.params.split_last() {
            for param in leading {
                write!(f, " {}", param)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}
