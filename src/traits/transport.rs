//! Byte-stream transport abstraction.

/// A bidirectional byte stream carrying `<...>` frames.
///
/// The engine never blocks on the transport: reads are polled one byte at a
/// time and `Ok(None)` means no byte is available right now. Transport errors
/// propagate out of [`tick`](crate::DccExClient::tick) unchanged; the engine
/// holds no transport state, so the caller may retry the next tick.
pub trait Transport {
    /// Transport-specific error type.
    type Error;

    /// Read one byte without blocking; `Ok(None)` when nothing is pending.
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Write a complete frame.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}
