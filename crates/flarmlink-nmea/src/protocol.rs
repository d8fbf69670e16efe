//! Line framing and checksum handling for the FLARM data port.
//!
//! The data port is a stream of ASCII sentences, one per line:
//!
//! ```text
//! $PFLAV,A,7.0,7.20,ALPS_2024*6B\r\n
//! ```
//!
//! A sentence starts with `$`, its fields are comma-separated, and it ends
//! with an optional `*HH` checksum: the XOR of every byte between `$` and
//! `*`, as two hexadecimal digits. Lines end in `\n`, usually preceded by
//! `\r`.
//!
//! TCP delivers arbitrary fragments of that stream. [`LineBuffer`]
//! reassembles them and hands out complete lines only.

use bytes::{Buf, BytesMut};

use crate::sentence::Rejection;

/// The newline byte that terminates every line on the data port.
pub const TERMINATOR: u8 = b'\n';

/// Maximum buffer size before reset to prevent unbounded growth.
///
/// NMEA sentences are at most 82 characters; FLARM's proprietary ones are a
/// bit longer. A buffer this large without a newline is noise.
pub const MAX_BUF: usize = 8192;

/// Result of attempting to decode one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was decoded, line ending stripped.
    Line {
        /// The line text without `\r\n`.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// A complete line was found but is not valid UTF-8; skip this many bytes.
    Garbage(usize),

    /// The buffer does not yet contain a complete line.
    Incomplete,
}

/// Decode one newline-terminated line from a byte buffer.
///
/// Returns the first complete line, or [`DecodeResult::Incomplete`] if no
/// terminator is present yet. Partial data is never returned.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let term_pos = match buf.iter().position(|&b| b == TERMINATOR) {
        Some(pos) => pos,
        None => return DecodeResult::Incomplete,
    };

    let consumed = term_pos + 1;
    let mut body = &buf[..term_pos];
    if let Some(stripped) = body.strip_suffix(b"\r") {
        body = stripped;
    }

    match std::str::from_utf8(body) {
        Ok(text) => DecodeResult::Line {
            text: text.to_string(),
            consumed,
        },
        Err(_) => DecodeResult::Garbage(consumed),
    }
}

/// Compute the NMEA checksum (XOR of all bytes) of a sentence body.
///
/// `body` is the text between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Frame a sentence body as a complete sentence with checksum.
///
/// The result carries no line ending.
///
/// # Examples
///
/// ```
/// use flarmlink_nmea::protocol::frame_sentence;
///
/// assert_eq!(frame_sentence("PFLAV,R"), "$PFLAV,R*33");
/// ```
pub fn frame_sentence(body: &str) -> String {
    format!("${}*{:02X}", body, checksum(body))
}

/// Strip framing from a line and validate its checksum.
///
/// Returns the sentence body (between `$` and `*`). If the line carries a
/// checksum it must be two hex digits and must match. If it carries none,
/// the line is accepted unless `require_checksum` is set.
pub fn unframe(line: &str, require_checksum: bool) -> Result<&str, Rejection> {
    let line = line.trim_end();
    if line.is_empty() {
        return Err(Rejection::Empty);
    }
    if !line.is_ascii() {
        return Err(Rejection::NonAscii);
    }

    let rest = line.strip_prefix('$').ok_or(Rejection::MissingStart)?;

    match rest.rsplit_once('*') {
        Some((body, field)) => {
            let expected = parse_checksum_field(field)
                .ok_or_else(|| Rejection::MalformedChecksum(field.to_string()))?;
            let computed = checksum(body);
            if expected != computed {
                return Err(Rejection::ChecksumMismatch { expected, computed });
            }
            Ok(body)
        }
        None if require_checksum => Err(Rejection::MissingChecksum),
        None => Ok(rest),
    }
}

fn parse_checksum_field(field: &str) -> Option<u8> {
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(field, 16).ok()
}

/// Reassembles transport fragments into complete lines.
///
/// Bytes are appended with [`push`](LineBuffer::push); complete lines are
/// taken with [`next_line`](LineBuffer::next_line). A trailing partial line
/// stays buffered until the rest of it arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Create an empty line buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    ///
    /// If the buffer grows beyond [`MAX_BUF`] without containing a line
    /// terminator, it is cleared and `false` is returned.
    pub fn push(&mut self, data: &[u8]) -> bool {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_BUF && !self.buf.contains(&TERMINATOR) {
            tracing::warn!(len = self.buf.len(), "line buffer overflow, resetting");
            self.buf.clear();
            return false;
        }
        true
    }

    /// Take the next complete, non-empty line out of the buffer.
    ///
    /// Lines that are not valid UTF-8 are skipped.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            match decode_line(&self.buf) {
                DecodeResult::Line { text, consumed } => {
                    self.buf.advance(consumed);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
                DecodeResult::Garbage(consumed) => {
                    self.buf.advance(consumed);
                    tracing::trace!(bytes = consumed, "skipping non-UTF-8 line");
                }
                DecodeResult::Incomplete => return None,
            }
        }
    }

    /// Number of buffered bytes not yet returned as lines.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
