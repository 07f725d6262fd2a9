//! Frame tokenizer for the `<...>` wire syntax.
//!
//! A frame is an opcode byte followed by whitespace-separated parameters.
//! Each parameter is either a signed decimal number, a quoted text span, or
//! an unquoted keyword. Keywords are folded into a rolling hash at tokenize
//! time so handlers can compare them against precomputed constants; see
//! [`keyword_hash`]. The `i` opcode (server info banner) bypasses normal
//! tokenizing and captures the remainder of the frame as one text parameter.
//!
//! Text parameters borrow from the frame buffer and are only valid while the
//! buffer lives; handlers that retain text must copy it first.
//!
//! # Example
//!
//! ```rust
//! use rs_dccex::tokenizer::{Frame, Param};
//!
//! let frame = Frame::parse(b"<jR 42 \"L42\" \"F42\">").unwrap();
//! assert_eq!(frame.opcode(), b'j');
//! assert_eq!(frame.number(1), Some(42));
//! assert_eq!(frame.text(2), Some("L42"));
//! assert!(matches!(frame.param(0), Some(Param::Number(82)))); // 'R'
//! ```

use crate::config::MAX_COMMAND_PARAMS;
use heapless::Vec as HVec;

/// Rolling hash used to fold unquoted keywords into an integer token.
///
/// Identical to the command station's own folding: lowercase letters are
/// uppercased, then `h = ((h << 5) + h) ^ byte` over a wrapping `i32`.
/// A single letter hashes to its ASCII code.
pub const fn keyword_hash(word: &str) -> i32 {
    let bytes = word.as_bytes();
    let mut h: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let mut b = bytes[i];
        if b >= b'a' && b <= b'z' {
            b = b - b'a' + b'A';
        }
        h = (h.wrapping_shl(5)).wrapping_add(h) ^ (b as i32);
        i += 1;
    }
    h
}

/// Track power / join keywords.
pub const KW_MAIN: i32 = keyword_hash("MAIN");
/// Programming track keyword.
pub const KW_PROG: i32 = keyword_hash("PROG");
/// DC track mode keyword.
pub const KW_DC: i32 = keyword_hash("DC");
/// Reverse-polarity DC track mode keyword.
pub const KW_DCX: i32 = keyword_hash("DCX");
/// Track disabled keyword.
pub const KW_NONE: i32 = keyword_hash("NONE");
/// Join main and programming tracks keyword.
pub const KW_JOIN: i32 = keyword_hash("JOIN");
/// Route start keyword.
pub const KW_START: i32 = keyword_hash("START");
/// Route pause keyword.
pub const KW_PAUSE: i32 = keyword_hash("PAUSE");
/// Route resume keyword.
pub const KW_RESUME: i32 = keyword_hash("RESUME");

/// A tokenized parameter.
///
/// An explicit sum type: numbers (including folded keywords) and text spans
/// never share an encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Param<'a> {
    /// A signed integer, or the rolling hash of an unquoted keyword.
    Number(i32),
    /// A quoted text span borrowing the frame buffer.
    Text(&'a str),
}

/// Tokenizer failure reasons.
///
/// All of these abort the frame without dispatch; the engine recovers by
/// waiting for the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenizeError {
    /// The buffer ended before the closing `>`.
    MissingTerminator,
    /// More than [`MAX_COMMAND_PARAMS`] parameters.
    TooManyParameters,
    /// A text parameter was not valid UTF-8.
    InvalidText,
    /// The buffer ended before an opcode byte was seen.
    Empty,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    SeekOpen,
    ReadOpcode,
    SkipSpaces,
    CheckSignOrQuote,
    BuildNumber,
    SkipText,
    Passthrough,
}

/// One tokenized frame.
#[derive(Debug)]
pub struct Frame<'a> {
    opcode: u8,
    params: HVec<Param<'a>, MAX_COMMAND_PARAMS>,
}

impl<'a> Frame<'a> {
    /// Tokenize one complete frame.
    ///
    /// The buffer must contain the full frame including `<` and `>`;
    /// leading garbage before `<` is skipped.
    pub fn parse(buf: &'a [u8]) -> Result<Self, TokenizeError> {
        let mut params: HVec<Param<'a>, MAX_COMMAND_PARAMS> = HVec::new();
        let mut opcode: u8 = 0;

        let mut state = State::SeekOpen;
        let mut running: i32 = 0;
        let mut negative = false;
        let mut text_start = 0usize;

        let mut i = 0usize;
        while i < buf.len() {
            let hot = buf[i];
            match state {
                State::SeekOpen => {
                    if hot == b'<' {
                        state = State::ReadOpcode;
                    }
                    i += 1;
                }
                State::ReadOpcode => {
                    opcode = hot;
                    if opcode == b'i' {
                        // <iDCCEX ...> breaks all normal rules: the body is
                        // one verbatim text parameter.
                        text_start = i + 1;
                        state = State::Passthrough;
                    } else {
                        state = State::SkipSpaces;
                    }
                    i += 1;
                }
                State::SkipSpaces => {
                    if hot == b' ' {
                        i += 1;
                    } else if hot == b'>' {
                        return Ok(Frame { opcode, params });
                    } else {
                        state = State::CheckSignOrQuote;
                    }
                }
                State::CheckSignOrQuote => {
                    if hot == b'"' {
                        text_start = i + 1;
                        state = State::SkipText;
                        i += 1;
                    } else {
                        running = 0;
                        negative = hot == b'-';
                        state = State::BuildNumber;
                        if negative {
                            i += 1;
                        }
                    }
                }
                State::BuildNumber => {
                    if hot.is_ascii_digit() {
                        running = running.wrapping_mul(10).wrapping_add((hot - b'0') as i32);
                        i += 1;
                    } else if hot == b'_' || hot.is_ascii_alphabetic() {
                        let up = hot.to_ascii_uppercase();
                        running = (running.wrapping_shl(5)).wrapping_add(running) ^ (up as i32);
                        i += 1;
                    } else {
                        // End of parameter; rescan this byte as a separator.
                        let value = if negative { -running } else { running };
                        params
                            .push(Param::Number(value))
                            .map_err(|_| TokenizeError::TooManyParameters)?;
                        state = State::SkipSpaces;
                    }
                }
                State::SkipText => {
                    if hot == b'"' {
                        let text = core::str::from_utf8(&buf[text_start..i])
                            .map_err(|_| TokenizeError::InvalidText)?;
                        params
                            .push(Param::Text(text))
                            .map_err(|_| TokenizeError::TooManyParameters)?;
                        state = State::SkipSpaces;
                    }
                    i += 1;
                }
                State::Passthrough => {
                    if hot == b'>' {
                        let text = core::str::from_utf8(&buf[text_start..i])
                            .map_err(|_| TokenizeError::InvalidText)?;
                        params
                            .push(Param::Text(text))
                            .map_err(|_| TokenizeError::TooManyParameters)?;
                        return Ok(Frame { opcode, params });
                    }
                    i += 1;
                }
            }
        }

        if state == State::SeekOpen || state == State::ReadOpcode {
            Err(TokenizeError::Empty)
        } else {
            Err(TokenizeError::MissingTerminator)
        }
    }

    /// The opcode byte (first byte after `<`).
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Number of parameters tokenized.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// The parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<Param<'a>> {
        self.params.get(index).copied()
    }

    /// The numeric value at `index`, or `None` if absent or text.
    pub fn number(&self, index: usize) -> Option<i32> {
        match self.params.get(index) {
            Some(Param::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// The text span at `index`, or `None` if absent or numeric.
    pub fn text(&self, index: usize) -> Option<&'a str> {
        match self.params.get(index) {
            Some(Param::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether the parameter at `index` is a text span.
    pub fn is_text(&self, index: usize) -> bool {
        matches!(self.params.get(index), Some(Param::Text(_)))
    }

    /// Whether every parameter is numeric.
    pub fn all_numbers(&self) -> bool {
        self.params.iter().all(|p| matches!(p, Param::Number(_)))
    }
}
