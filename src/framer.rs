//! Inbound framer: accumulates transport bytes into complete frames.
//!
//! Bytes are pushed one at a time into a bounded buffer. When the closing
//! `>` arrives the accumulated frame is handed back for tokenizing and the
//! buffer resets. If the buffer would overflow before the terminator, the
//! partial frame is dropped and accumulation restarts from scratch; the next
//! `<` on the wire begins a fresh frame. This is the whole resynchronization
//! policy: no error escapes, no partial data is retained.

use crate::config::MAX_COMMAND_BUFFER;
use heapless::Vec as HVec;

/// Bounded accumulator for one inbound frame.
#[derive(Debug, Default)]
pub struct Framer {
    buf: HVec<u8, MAX_COMMAND_BUFFER>,
}

impl Framer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one byte.
    ///
    /// Returns `true` when the byte completed a frame; the frame is then
    /// available via [`take_frame`](Self::take_frame).
    pub fn push(&mut self, byte: u8) -> bool {
        if self.buf.push(byte).is_err() {
            // Overflow: drop the partial frame and resynchronize.
            log::warn!("inbound buffer overflow after {} bytes, resyncing", self.buf.len());
            self.buf.clear();
            // The overflowing byte itself may start the next frame.
            if byte == b'<' {
                let _ = self.buf.push(byte);
            }
            return false;
        }
        byte == b'>'
    }

    /// Take the completed frame, leaving the framer empty.
    pub fn take_frame(&mut self) -> HVec<u8, MAX_COMMAND_BUFFER> {
        core::mem::take(&mut self.buf)
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
