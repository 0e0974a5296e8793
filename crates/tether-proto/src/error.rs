//! Error types for line framing and message parsing.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised by the line codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound line contained an embedded line break.
    #[error("outbound line contains an embedded line break")]
    EmbeddedNewline,
}

/// Reasons a raw line could not be turned into a [`crate::Message`].
///
/// Callers on the read path treat every variant the same way: the line is
/// dropped and reading continues.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is shorter than the smallest meaningful frame.
    #[error("line too short: {len} bytes")]
    TooShort {
        /// Length after trimming the line terminator.
        len: usize,
    },

    /// A tag block (`@...`) was not followed by a space.
    #[error("tag block is not terminated by a space")]
    UnterminatedTags,

    /// A source prefix (`:...`) was not followed by a space.
    #[error("source prefix is not terminated by a space")]
    UnterminatedSource,

    /// Nothing was left to use as the verb.
    #[error("missing verb")]
    MissingVerb,
}
