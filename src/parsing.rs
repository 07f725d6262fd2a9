//! Small wire-level parsing helpers.
//!
//! Covers the pieces of the protocol that are not `<...>` parameter
//! tokenizing: the server version banner, the combined speed/direction byte,
//! and the `/`-separated function-label list carried by roster details.

use crate::config::MAX_FUNCTIONS;
use crate::model::Direction;

// ============================================================================
// Version banner
// ============================================================================

/// Parse the server-info banner for a three-part version.
///
/// The banner looks like `DCCEX V-1.2.3-label / MEGA / ...`. The first three
/// integers separated by `-` or `.` delimiters yield (major, minor, patch).
/// Numbers longer than 4 digits abort the scan; a trailing `-label` is
/// ignored. Returns `None` unless all three parts were found.
///
/// # Example
///
/// ```rust
/// use rs_dccex::parsing::parse_version_banner;
///
/// let banner = "DCCEX V-1.2.3-smartass / MEGA / STANDARD_MOTOR_SHIELD / 7";
/// assert_eq!(parse_version_banner(banner), Some((1, 2, 3)));
/// ```
pub fn parse_version_banner(text: &str) -> Option<(u16, u16, u16)> {
    let bytes = text.as_bytes();
    let mut parts = [0u16; 3];
    let mut collected = 0usize;

    // Find the first digit
    let mut i = bytes.iter().position(|b| b.is_ascii_digit())?;

    while collected < 3 {
        let start = i;
        let mut value: u32 = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            value = value * 10 + (bytes[i] - b'0') as u32;
            i += 1;
            if i - start > 4 {
                // Overlong number aborts the scan.
                return None;
            }
        }
        parts[collected] = value as u16;
        collected += 1;
        if collected == 3 {
            break;
        }
        // Parts are joined by '-' or '.'; anything else ends the scan.
        if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'.') {
            i += 1;
            if i >= bytes.len() || !bytes[i].is_ascii_digit() {
                return None;
            }
        } else {
            return None;
        }
    }

    Some((parts[0], parts[1], parts[2]))
}

// ============================================================================
// Speed byte
// ============================================================================

/// Decode a combined speed/direction byte.
///
/// Bit 7 carries the direction (1 = forward); bits 0..=6 carry the raw speed
/// where both 0 and 1 mean stopped (1 denotes emergency stop). The decoded
/// speed is `max(0, raw - 1)`.
pub fn decode_speed_byte(byte: u8) -> (u8, Direction) {
    let direction = if byte & 0x80 != 0 {
        Direction::Forward
    } else {
        Direction::Reverse
    };
    let speed = (byte & 0x7F).saturating_sub(1);
    (speed, direction)
}

/// Whether a raw speed byte encodes an emergency stop (raw value 1, either
/// direction bit).
pub fn is_emergency_stop(byte: u8) -> bool {
    byte & 0x7F == 1
}

/// Encode (speed, direction) into a speed byte.
///
/// Inverse of [`decode_speed_byte`] on the non-emergency range: speed 0
/// encodes as raw 0, speed `s > 0` as raw `s + 1`.
pub fn encode_speed_byte(speed: u8, direction: Direction) -> u8 {
    let raw = if speed == 0 {
        0
    } else {
        speed.min(crate::config::MAX_SPEED) + 1
    };
    match direction {
        Direction::Forward => raw | 0x80,
        Direction::Reverse => raw,
    }
}

// ============================================================================
// Function labels
// ============================================================================

/// Split a roster function-label list.
///
/// Labels are `/`-separated; a leading `*` marks the function as momentary.
/// Yields `(function_number, label, momentary)` for at most
/// [`MAX_FUNCTIONS`] entries. Empty slots still yield (with an empty label)
/// so function numbering stays aligned.
pub fn split_function_labels(labels: &str) -> impl Iterator<Item = (usize, &str, bool)> {
    labels
        .split('/')
        .enumerate()
        .take(MAX_FUNCTIONS)
        .map(|(i, raw)| {
            let momentary = raw.starts_with('*');
            let label = if momentary { &raw[1..] } else { raw };
            (i, label, momentary)
        })
}
