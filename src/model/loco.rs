//! Locomotive entity: address, identity, live state, and pending intent.
//!
//! A [`Loco`] carries two layers of state. The *acknowledged* layer (speed,
//! direction, function bitmap) only changes when the command station
//! broadcasts it. The *pending* layer holds the latest user intent awaiting
//! a coalesced flush; see the [`throttle`](crate::throttle) module for the
//! rules tying the two together.

use crate::config::{
    name_string, NameString, MAX_FUNCTIONS, MAX_FUNCTION_NUMBER, MAX_LOCO_ADDRESS,
    MAX_SPEED, MIN_LOCO_ADDRESS,
};
use crate::parsing::split_function_labels;

/// Bits 0..=28 of the function bitmap; higher bits are never valid.
pub const FUNCTION_MAP_MASK: u32 = (1 << (MAX_FUNCTION_NUMBER as u32 + 1)) - 1;

/// Direction of travel.
///
/// On the wire, direction is bit 7 of the speed byte and the trailing
/// parameter of a `t` throttle frame (1 = forward, 0 = reverse).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Moving forward.
    #[default]
    Forward,
    /// Moving in reverse.
    Reverse,
}

impl Direction {
    /// Wire encoding used by throttle frames.
    pub const fn wire_code(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }

    /// The opposite direction.
    pub const fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Where a locomotive entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LocoSource {
    /// Listed in the command station roster.
    Roster,
    /// Entered locally by address.
    Local,
}

/// A locomotive.
#[derive(Debug)]
pub struct Loco {
    address: u16,
    name: Option<NameString>,
    source: LocoSource,
    speed: u8,
    direction: Direction,
    function_states: u32,
    momentary_flags: u32,
    function_names: [Option<NameString>; MAX_FUNCTIONS],
    pending_speed: u8,
    pending_direction: Direction,
    pending: bool,
}

impl Loco {
    /// Create a locomotive with the given address.
    ///
    /// Returns `None` if the address is outside 1..=10239; address 0 is
    /// never admitted into the model.
    pub fn new(address: u16, source: LocoSource) -> Option<Self> {
        if !(MIN_LOCO_ADDRESS..=MAX_LOCO_ADDRESS).contains(&address) {
            return None;
        }
        Some(Self {
            address,
            name: None,
            source,
            speed: 0,
            direction: Direction::Forward,
            function_states: 0,
            momentary_flags: 0,
            function_names: core::array::from_fn(|_| None),
            pending_speed: 0,
            pending_direction: Direction::Forward,
            pending: false,
        })
    }

    /// DCC address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Roster name, if one has been received.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the roster name.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name_string(name));
    }

    /// Entry source.
    pub fn source(&self) -> LocoSource {
        self.source
    }

    /// Last acknowledged speed (0..=126).
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Record a server-acknowledged speed.
    pub fn set_speed(&mut self, speed: u8) {
        self.speed = speed.min(MAX_SPEED);
    }

    /// Last acknowledged direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Record a server-acknowledged direction.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// The 29-bit function bitmap.
    pub fn function_states(&self) -> u32 {
        self.function_states
    }

    /// Record the function bitmap from a broadcast; bits 29..=31 are
    /// masked off.
    pub fn set_function_states(&mut self, states: u32) {
        self.function_states = states & FUNCTION_MAP_MASK;
    }

    /// Whether function `number` is on.
    pub fn is_function_on(&self, number: u8) -> bool {
        number <= MAX_FUNCTION_NUMBER && self.function_states & (1 << number) != 0
    }

    /// Whether function `number` is momentary (pulsed rather than latched).
    pub fn is_function_momentary(&self, number: u8) -> bool {
        (number as usize) < MAX_FUNCTIONS && self.momentary_flags & (1 << number) != 0
    }

    /// The label for function `number`, if the roster supplied one.
    pub fn function_name(&self, number: u8) -> Option<&str> {
        self.function_names
            .get(number as usize)
            .and_then(|n| n.as_deref())
    }

    /// Populate function labels from a roster detail list.
    ///
    /// Labels are `/`-separated; a leading `*` marks a momentary function.
    /// Empty labels leave the slot unnamed.
    pub fn set_function_labels(&mut self, labels: &str) {
        self.momentary_flags = 0;
        self.function_names = core::array::from_fn(|_| None);
        for (number, label, momentary) in split_function_labels(labels) {
            if !label.is_empty() {
                self.function_names[number] = Some(name_string(label));
            }
            if momentary {
                self.momentary_flags |= 1 << number;
            }
        }
    }

    // ------------------------------------------------------------------
    // Pending intent (written by the coalescer)
    // ------------------------------------------------------------------

    /// Latest user-requested speed awaiting flush.
    pub fn pending_speed(&self) -> u8 {
        self.pending_speed
    }

    /// Latest user-requested direction awaiting flush.
    pub fn pending_direction(&self) -> Direction {
        self.pending_direction
    }

    /// Whether an unflushed intent differs from acknowledged state.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn set_pending_state(&mut self, speed: u8, direction: Direction, pending: bool) {
        self.pending_speed = speed;
        self.pending_direction = direction;
        self.pending = pending;
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn rejects_address_zero() {
        assert!(Loco::new(0, LocoSource::Local).is_none());
    }

    #[test]
    fn rejects_out_of_range_address() {
        assert!(Loco::new(10240, LocoSource::Local).is_none());
        assert!(Loco::new(1, LocoSource::Local).is_some());
        assert!(Loco::new(10239, LocoSource::Roster).is_some());
    }

    #[test]
    fn fresh_loco_state() {
        let loco = Loco::new(42, LocoSource::Roster).unwrap();
        assert_eq!(loco.address(), 42);
        assert_eq!(loco.speed(), 0);
        assert_eq!(loco.direction(), Direction::Forward);
        assert!(loco.name().is_none());
        assert!(!loco.has_pending());
        assert_eq!(loco.function_states(), 0);
    }

    // =========================================================================
    // Speed and direction
    // =========================================================================

    #[test]
    fn speed_clamped_to_max() {
        let mut loco = Loco::new(42, LocoSource::Local).unwrap();
        loco.set_speed(200);
        assert_eq!(loco.speed(), 126);
    }

    #[test]
    fn direction_wire_codes() {
        assert_eq!(Direction::Forward.wire_code(), 1);
        assert_eq!(Direction::Reverse.wire_code(), 0);
        assert_eq!(Direction::Forward.flipped(), Direction::Reverse);
        assert_eq!(Direction::Reverse.flipped(), Direction::Forward);
    }

    // =========================================================================
    // Function bitmap
    // =========================================================================

    #[test]
    fn function_map_masks_high_bits() {
        let mut loco = Loco::new(42, LocoSource::Roster).unwrap();
        loco.set_function_states(0xFFFF_FFFF);
        assert_eq!(loco.function_states(), FUNCTION_MAP_MASK);
        assert!(loco.is_function_on(28));
        assert!(!loco.is_function_on(29));
    }

    #[test]
    fn function_bit_28_decodes() {
        let mut loco = Loco::new(42, LocoSource::Roster).unwrap();
        loco.set_function_states(1 << 28);
        assert!(loco.is_function_on(28));
        assert!(!loco.is_function_on(0));
    }

    #[test]
    fn function_labels_and_momentary_flags() {
        let mut loco = Loco::new(42, LocoSource::Roster).unwrap();
        loco.set_function_labels("Headlight/Bell/*Horn//Cab Light");
        assert_eq!(loco.function_name(0), Some("Headlight"));
        assert_eq!(loco.function_name(2), Some("Horn"));
        assert_eq!(loco.function_name(3), None);
        assert_eq!(loco.function_name(4), Some("Cab Light"));
        assert!(loco.is_function_momentary(2));
        assert!(!loco.is_function_momentary(0));
    }

    #[test]
    fn relabelling_resets_old_labels() {
        let mut loco = Loco::new(42, LocoSource::Roster).unwrap();
        loco.set_function_labels("*A/B/C");
        loco.set_function_labels("X");
        assert_eq!(loco.function_name(0), Some("X"));
        assert_eq!(loco.function_name(1), None);
        assert!(!loco.is_function_momentary(0));
    }
}
