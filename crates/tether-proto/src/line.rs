//! Line-based codec for tokio.
//!
//! Reads newline-terminated lines with a hard upper bound on line length so
//! a misbehaving server cannot make the client buffer without limit.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};

/// Default maximum line length: 8 KiB of tags plus a classic 512-byte body.
pub const DEFAULT_MAX_LINE_LEN: usize = 8192 + 512;

/// Newline-framed codec.
///
/// Decoded lines keep their terminator so raw observers see exactly what
/// arrived. Invalid UTF-8 is replaced rather than rejected.
///
/// Lines longer than the limit are discarded up to and including their
/// terminator; decoding then resumes with the next line. The number of
/// discarded lines is available through [`LineCodec::take_discarded`].
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Currently skipping the tail of an overlong line
    discarding: bool,
    discarded: usize,
}

impl LineCodec {
    /// Create a codec with [`DEFAULT_MAX_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
            discarded: 0,
        }
    }

    /// The configured line length limit.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Return and reset the count of overlong lines dropped so far.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    src.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                    self.discarded += 1;
                }
                (true, None) => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(end)) => {
                    self.next_index = 0;
                    if end + 1 > self.max_len {
                        src.advance(end + 1);
                        self.discarded += 1;
                        continue;
                    }
                    let line = src.split_to(end + 1);
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                (false, None) => {
                    if src.len() > self.max_len {
                        src.clear();
                        self.next_index = 0;
                        self.discarding = true;
                    } else {
                        self.next_index = src.len();
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        let body = line.trim_end_matches(['\r', '\n']);
        if body.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedNewline);
        }
        dst.reserve(body.len() + 2);
        dst.extend_from_slice(body.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
