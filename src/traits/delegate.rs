//! Observer callbacks for server broadcasts and responses.

use crate::model::Loco;
use crate::protocol::{TrackMode, TrackPower};

/// Receiver for everything the command station announces.
///
/// Every method has a no-op default, so an application implements only what
/// it cares about. Callbacks fire synchronously from inside
/// [`tick`](crate::DccExClient::tick); the delegate must not reentrantly
/// drive the engine.
///
/// Text arguments borrow the inbound frame buffer and are only valid for the
/// duration of the call.
pub trait Delegate {
    /// Server version banner parsed into (major, minor, patch).
    fn received_server_version(&mut self, _major: u16, _minor: u16, _patch: u16) {}

    /// Free-text broadcast message.
    fn received_message(&mut self, _message: &str) {}

    /// Screen update destined for a hardware display.
    fn received_screen_update(&mut self, _screen: i32, _row: i32, _text: &str) {}

    /// Global track power change.
    fn received_track_power(&mut self, _power: TrackPower) {}

    /// Per-track power change. `track` is the raw wire token: `b'A'..=b'Z'`
    /// for a track letter, or a folded keyword for the named tracks.
    fn received_individual_track_power(&mut self, _power: TrackPower, _track: i32) {}

    /// Track mode assignment for a track letter.
    fn received_track_type(&mut self, _track: char, _mode: TrackMode, _address: Option<i32>) {}

    /// Speed, direction, or function change for a known locomotive.
    fn received_loco_update(&mut self, _loco: &Loco) {}

    /// The roster and all its details have been fetched.
    fn received_roster_list(&mut self) {}

    /// The turnout list and all its details have been fetched.
    fn received_turnout_list(&mut self) {}

    /// The route list and all its details have been fetched.
    fn received_route_list(&mut self) {}

    /// The turntable list, descriptors, and index tables have been fetched.
    fn received_turntable_list(&mut self) {}

    /// Every requested inventory list has been fetched.
    fn received_lists(&mut self) {}

    /// Turnout state broadcast.
    fn received_turnout_action(&mut self, _id: i32, _thrown: bool) {}

    /// Turntable position broadcast.
    fn received_turntable_action(&mut self, _id: i32, _index: i32, _moving: bool) {}

    /// Programming-track loco address read result; -1 on failure.
    fn received_read_loco(&mut self, _address: i32) {}

    /// Loco address write result; -1 on failure.
    fn received_write_loco(&mut self, _address: i32) {}

    /// CV validation result.
    fn received_validate_cv(&mut self, _cv: i32, _value: i32) {}

    /// CV bit validation result.
    fn received_validate_cv_bit(&mut self, _cv: i32, _bit: i32, _value: i32) {}

    /// CV write result.
    fn received_write_cv(&mut self, _cv: i32, _value: i32) {}

    /// A CS-consist definition arrived; `lead` identifies it in the registry.
    fn received_consist_update(&mut self, _lead: u16) {}

    /// Fast clock broadcast: minutes since midnight and speed-up rate.
    fn received_fast_clock(&mut self, _minutes: i32, _rate: i32) {}
}

/// Delegate that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDelegate;

impl Delegate for NullDelegate {}
