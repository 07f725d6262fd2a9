//! Protocol limits and tunable timing configuration.
//!
//! The hard limits mirror the command station's own buffer sizes and are
//! compile-time constants; the timing knobs (coalescing window, heartbeat)
//! are runtime-configurable through builder methods.
//!
//! # Example
//!
//! ```rust
//! use rs_dccex::config::Config;
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_flush_interval_ms(250)
//!     .with_heartbeat(30_000);
//! ```

use heapless::String as HString;

/// Maximum number of bytes buffered for one inbound frame.
pub const MAX_COMMAND_BUFFER: usize = 500;

/// Maximum number of parameters tokenized from one frame.
pub const MAX_COMMAND_PARAMS: usize = 50;

/// Maximum number of bytes in one outbound frame, including `<` and `>`.
pub const MAX_OUTBOUND_COMMAND_LENGTH: usize = 100;

/// Maximum number of functions tracked per locomotive.
///
/// The function bitmap is 32 bits wide but the command station only
/// transmits functions 0..=28.
pub const MAX_FUNCTIONS: usize = 32;

/// Highest function number carried in the wire bitmap.
pub const MAX_FUNCTION_NUMBER: u8 = 28;

/// Maximum length of an entity name or description.
pub const MAX_OBJECT_NAME_LENGTH: usize = 32;

/// Lowest valid DCC locomotive address.
pub const MIN_LOCO_ADDRESS: u16 = 1;

/// Highest valid DCC locomotive address.
pub const MAX_LOCO_ADDRESS: u16 = 10239;

/// Maximum speed step value.
pub const MAX_SPEED: u8 = 126;

/// Type alias for entity name strings.
pub type NameString = HString<MAX_OBJECT_NAME_LENGTH>;

/// Create a [`NameString`] from a `&str`, truncating if too long.
pub fn name_string(s: &str) -> NameString {
    let mut end = s.len().min(MAX_OBJECT_NAME_LENGTH);
    // Back off to a char boundary so truncation never splits a code point
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut hs = NameString::new();
    let _ = hs.push_str(&s[..end]);
    hs
}

// ============================================================================
// Runtime configuration
// ============================================================================

/// Engine timing configuration.
///
/// All intervals are in milliseconds and evaluated against the `now_ms`
/// value the application passes into [`tick`](crate::DccExClient::tick).
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Quiet interval before buffered throttle intents are flushed.
    pub flush_interval_ms: u64,
    /// Interval between heartbeat frames when no other traffic is sent.
    pub heartbeat_interval_ms: u64,
    /// Whether heartbeat frames are emitted at all.
    pub heartbeat_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            heartbeat_interval_ms: 60_000,
            heartbeat_enabled: false,
        }
    }
}

impl Config {
    /// Set the throttle coalescing window.
    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Enable the heartbeat with the given interval.
    pub fn with_heartbeat(mut self, interval_ms: u64) -> Self {
        self.heartbeat_enabled = true;
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Disable the heartbeat.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_enabled = false;
        self
    }
}
