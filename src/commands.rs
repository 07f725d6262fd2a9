//! Outbound frame construction.
//!
//! One bounded scratch buffer assembles every outbound frame, so the maximum
//! outbound length is enforced in a single place. Appends past the limit are
//! dropped rather than split: room for the closing `>` is always reserved,
//! and a truncated frame is flagged so the engine can decline to send it.

use crate::config::MAX_OUTBOUND_COMMAND_LENGTH;

use core::fmt::Write as _;
use heapless::String as HString;

/// Scratch buffer for the outbound frame being assembled.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    buf: HString<MAX_OUTBOUND_COMMAND_LENGTH>,
    truncated: bool,
}

impl CommandBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a frame: clears the buffer and writes `<` plus the opcode.
    pub fn begin(&mut self, opcode: char) -> &mut Self {
        self.buf.clear();
        self.truncated = false;
        self.push_char('<');
        self.push_char(opcode);
        self
    }

    /// Append a raw character (no separator).
    pub fn append_char(&mut self, ch: char) -> &mut Self {
        self.push_char(ch);
        self
    }

    /// Append a signed integer parameter, preceded by a space.
    pub fn append_number(&mut self, value: i32) -> &mut Self {
        let mut digits: HString<12> = HString::new();
        // i32 always fits in 12 bytes
        let _ = write!(digits, "{}", value);
        self.push_char(' ');
        self.push_str(&digits);
        self
    }

    /// Append a string parameter (keyword or text), preceded by a space.
    pub fn append_str(&mut self, value: &str) -> &mut Self {
        self.push_char(' ');
        self.push_str(value);
        self
    }

    /// Close the frame with `>` and return it, or `None` if any append was
    /// truncated.
    pub fn finalize(&mut self) -> Option<&str> {
        if self.truncated {
            return None;
        }
        // One byte is always reserved for this
        let _ = self.buf.push('>');
        Some(&self.buf)
    }

    fn push_char(&mut self, ch: char) {
        if self.buf.len() + ch.len_utf8() > MAX_OUTBOUND_COMMAND_LENGTH - 1 {
            self.truncated = true;
            return;
        }
        let _ = self.buf.push(ch);
    }

    fn push_str(&mut self, s: &str) {
        if self.buf.len() + s.len() > MAX_OUTBOUND_COMMAND_LENGTH - 1 {
            self.truncated = true;
            return;
        }
        let _ = self.buf.push_str(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_frame() {
        let mut buf = CommandBuffer::new();
        buf.begin('t').append_number(42).append_number(30).append_number(1);
        assert_eq!(buf.finalize(), Some("<t 42 30 1>"));
    }

    #[test]
    fn keyword_frame() {
        let mut buf = CommandBuffer::new();
        buf.begin('J').append_str("R").append_number(42);
        assert_eq!(buf.finalize(), Some("<J R 42>"));
    }

    #[test]
    fn negative_numbers() {
        let mut buf = CommandBuffer::new();
        buf.begin('^').append_number(42).append_number(-5).append_number(25);
        assert_eq!(buf.finalize(), Some("<^ 42 -5 25>"));
    }

    #[test]
    fn bare_opcode() {
        let mut buf = CommandBuffer::new();
        buf.begin('#');
        assert_eq!(buf.finalize(), Some("<#>"));
    }

    #[test]
    fn begin_resets_previous_frame() {
        let mut buf = CommandBuffer::new();
        buf.begin('t').append_number(1);
        let _ = buf.finalize();
        buf.begin('#');
        assert_eq!(buf.finalize(), Some("<#>"));
    }

    #[test]
    fn overflow_flags_truncation() {
        let mut buf = CommandBuffer::new();
        buf.begin('m');
        for _ in 0..60 {
            buf.append_number(1234);
        }
        assert_eq!(buf.finalize(), None);
    }

    #[test]
    fn frame_at_exact_capacity_still_closes() {
        let mut buf = CommandBuffer::new();
        buf.begin('m');
        // '<' + 'm' = 2 bytes; fill to the reserved limit exactly
        for _ in 0..(MAX_OUTBOUND_COMMAND_LENGTH - 3) {
            buf.append_char('x');
        }
        let frame = buf.finalize().unwrap();
        assert_eq!(frame.len(), MAX_OUTBOUND_COMMAND_LENGTH);
        assert!(frame.ends_with('>'));
    }
}
