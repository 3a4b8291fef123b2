//! # Serial-line framing: delimiters and byte stuffing.
//!
//! Frames are delimited by [`DELIMITER`] (0xC0) on both ends. A literal
//! delimiter inside the payload is stuffed as `DB DC`, a literal escape byte
//! as `DB DD`. Consecutive delimiters denote an empty frame and are discarded
//! on decode.
//!
//! Decoding is an explicit state machine rather than a transformation, so the
//! escape rule, lenient recovery, and empty-frame handling live in one match:
//!
//! ```text
//!              ┌────────── DELIMITER (frame complete, emit if non-empty)
//!              │
//! Payload ──── byte ──► push byte
//!    │  └──── ESCAPE ──► Escaped
//!    │
//! Escaped ─── ESCAPED_DELIMITER ──► push 0xC0 ──► Payload
//!    │  └──── ESCAPED_ESCAPE ────► push 0xDB ──► Payload
//!    └─────── anything else ─────► push as literal (lenient) ──► Payload
//! ```
//!
//! ## Rules
//! - Encode always emits a leading and a trailing delimiter.
//! - A dangling escape at end of input is dropped (nothing to expand).
//! - [`FrameSplitter`] recovers every complete frame from a byte run; bytes
//!   after the last delimiter stay buffered for the next feed.

/// Frame start/end marker.
pub const DELIMITER: u8 = 0xC0;
/// Escape introducer for stuffed bytes.
pub const ESCAPE: u8 = 0xDB;
/// Second escape byte standing in for a literal delimiter.
pub const ESCAPED_DELIMITER: u8 = 0xDC;
/// Second escape byte standing in for a literal escape.
pub const ESCAPED_ESCAPE: u8 = 0xDD;

/// Encodes a pre-framed payload into a wire frame.
///
/// Emits `C0 <stuffed payload> C0`. Never fails; any byte sequence is
/// encodable.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    // Worst case every byte is stuffed, plus the two delimiters.
    let mut out = Vec::with_capacity(payload.len() * 2 + 2);
    out.push(DELIMITER);
    for &b in payload {
        match b {
            DELIMITER => {
                out.push(ESCAPE);
                out.push(ESCAPED_DELIMITER);
            }
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPED_ESCAPE);
            }
            _ => out.push(b),
        }
    }
    out.push(DELIMITER);
    out
}

/// Decodes the first complete frame in `input`, returning its payload.
///
/// Returns `None` when the input holds no non-empty frame. Escape handling is
/// lenient: an unrecognized byte after [`ESCAPE`] is taken as a literal.
pub fn unframe(input: &[u8]) -> Option<Vec<u8>> {
    let mut splitter = FrameSplitter::new();
    let mut frames = splitter.feed(input);
    if frames.is_empty() {
        // The run may lack a trailing delimiter; flush what accumulated.
        splitter.flush()
    } else {
        Some(frames.remove(0))
    }
}

/// Decoder state between bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Payload,
    Escaped,
}

/// Incremental frame decoder.
///
/// Feed it byte runs as they arrive; it returns every frame completed by the
/// run and keeps the unterminated tail buffered. Used on the observer path
/// where a job's bytes always hold at least one whole packet, and by
/// diagnostics reading raw captures.
#[derive(Debug)]
pub struct FrameSplitter {
    state: DecodeState,
    current: Vec<u8>,
}

impl FrameSplitter {
    /// Creates a splitter with an empty buffer.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Payload,
            current: Vec::new(),
        }
    }

    /// Consumes a byte run, returning all frames it completed.
    ///
    /// Empty frames (consecutive delimiters) are discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            match self.state {
                DecodeState::Payload => match b {
                    DELIMITER => {
                        if !self.current.is_empty() {
                            frames.push(std::mem::take(&mut self.current));
                        }
                    }
                    ESCAPE => self.state = DecodeState::Escaped,
                    _ => self.current.push(b),
                },
                DecodeState::Escaped => {
                    let literal = match b {
                        ESCAPED_DELIMITER => DELIMITER,
                        ESCAPED_ESCAPE => ESCAPE,
                        // Lenient: unknown escape expands to the byte itself.
                        other => other,
                    };
                    self.current.push(literal);
                    self.state = DecodeState::Payload;
                }
            }
        }
        frames
    }

    /// Takes whatever accumulated without a closing delimiter.
    ///
    /// Returns `None` when the buffer is empty. A dangling escape is dropped.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.state = DecodeState::Payload;
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_wraps_payload_in_delimiters() {
        assert_eq!(frame(&[0x00, 0x05, 0x20, 0x25]), vec![
            0xC0, 0x00, 0x05, 0x20, 0x25, 0xC0
        ]);
    }

    #[test]
    fn delimiter_and_escape_are_stuffed() {
        assert_eq!(frame(&[0xC0]), vec![0xC0, 0xDB, 0xDC, 0xC0]);
        assert_eq!(frame(&[0xDB]), vec![0xC0, 0xDB, 0xDD, 0xC0]);
    }

    #[test]
    fn roundtrip_recovers_arbitrary_payloads() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0xC0, 0xDB, 0xC0, 0xDB],
            (0u8..=255).collect(),
        ];
        for p in payloads {
            let wire = frame(&p);
            assert_eq!(wire.first(), Some(&0xC0));
            assert_eq!(wire.last(), Some(&0xC0));
            if p.is_empty() {
                // Empty frames are discarded on decode.
                assert_eq!(unframe(&wire), None);
            } else {
                assert_eq!(unframe(&wire).unwrap(), p);
            }
        }
    }

    #[test]
    fn unknown_escape_passes_through_as_literal() {
        // DB 7F is not a defined escape pair; lenient decode keeps 0x7F.
        assert_eq!(unframe(&[0xC0, 0x01, 0xDB, 0x7F, 0x02, 0xC0]).unwrap(), vec![
            0x01, 0x7F, 0x02
        ]);
    }

    #[test]
    fn splitter_separates_back_to_back_frames() {
        let mut s = FrameSplitter::new();
        let frames = s.feed(&[0xC0, 0x01, 0xC0, 0xC0, 0xC0, 0x02, 0x03, 0xC0]);
        assert_eq!(frames, vec![vec![0x01], vec![0x02, 0x03]]);
    }

    #[test]
    fn splitter_buffers_partial_frames_across_feeds() {
        let mut s = FrameSplitter::new();
        assert!(s.feed(&[0xC0, 0x01, 0x02]).is_empty());
        let frames = s.feed(&[0x03, 0xC0]);
        assert_eq!(frames, vec![vec![0x01, 0x02, 0x03]]);
    }

    #[test]
    fn dangling_escape_is_dropped_on_flush() {
        let mut s = FrameSplitter::new();
        assert!(s.feed(&[0xC0, 0x01, 0xDB]).is_empty());
        assert_eq!(s.flush(), Some(vec![0x01]));
        assert_eq!(s.flush(), None);
    }
}
