//! Scripted in-memory transport for tests.

use crate::traits::Transport;

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

/// A transport fed from a script, capturing everything written.
///
/// Queue inbound bytes with [`queue`](Self::queue), drive the engine, then
/// inspect [`sent`](Self::sent) or [`sent_frames`](Self::sent_frames).
#[derive(Debug, Default)]
pub struct MockTransport {
    inbound: VecDeque<u8>,
    /// Raw bytes written by the engine, in order.
    pub sent: Vec<u8>,
}

impl MockTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the engine to read.
    pub fn queue(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Everything written so far, split into `<...>` frames.
    pub fn sent_frames(&self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut current = String::new();
        for &b in &self.sent {
            current.push(b as char);
            if b == b'>' {
                frames.push(core::mem::take(&mut current));
            }
        }
        frames
    }

    /// Drop all captured output.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

/// Mock transport failure; never produced by [`MockTransport`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl Transport for MockTransport {
    type Error = MockError;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.inbound.pop_front())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_queued_bytes_in_order() {
        let mut t = MockTransport::new();
        t.queue(b"<s>");
        assert_eq!(t.read_byte(), Ok(Some(b'<')));
        assert_eq!(t.read_byte(), Ok(Some(b's')));
        assert_eq!(t.read_byte(), Ok(Some(b'>')));
        assert_eq!(t.read_byte(), Ok(None));
    }

    #[test]
    fn captures_written_frames() {
        let mut t = MockTransport::new();
        t.write(b"<t 42 30 1>").unwrap();
        t.write(b"<#>").unwrap();
        assert_eq!(t.sent_frames(), ["<t 42 30 1>", "<#>"]);
    }
}
