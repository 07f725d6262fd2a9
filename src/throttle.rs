//! Throttle coalescing and heartbeat timing.
//!
//! Rapid speed-knob input produces many intermediate values per second;
//! sending each one floods the link and triggers a broadcast storm. Intents
//! are instead buffered per locomotive (latest wins) and released as a single
//! throttle frame once a quiet interval has passed since the last change.
//! Current speed/direction only move on server broadcast; the reconciliation
//! rules below decide when a buffered intent is considered delivered.

use crate::model::{Direction, Loco};
use crate::parsing::{decode_speed_byte, is_emergency_stop};

/// Buffer a throttle intent on a locomotive.
///
/// The pending flag is set iff the intent differs from the last-acknowledged
/// state; writing the current values back is a no-op and clears the flag.
pub(crate) fn set_pending(loco: &mut Loco, speed: u8, direction: Direction) {
    let pending = speed != loco.speed() || direction != loco.direction();
    loco.set_pending_state(speed, direction, pending);
}

/// Outcome of reconciling a loco broadcast against a pending intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reconciliation {
    /// Server-side emergency stop; the intent is discarded.
    EmergencyStop,
    /// The broadcast matches the intent; the server caught up.
    CaughtUp,
    /// Stale broadcast; the intent stays buffered for the next flush.
    Stale,
    /// Nothing was pending.
    Idle,
}

/// Apply a speed-byte broadcast to a locomotive and reconcile its intent.
///
/// Acknowledged speed/direction are always updated. A pending intent is
/// resolved per the broadcast: an emergency stop (raw 1 or 129) is
/// authoritative and clears the intent (speed zeroed, direction kept); a
/// broadcast equal to the intent clears the flag; anything else leaves the
/// intent buffered.
pub(crate) fn reconcile(loco: &mut Loco, speed_byte: u8) -> Reconciliation {
    let (speed, direction) = decode_speed_byte(speed_byte);
    let had_pending = loco.has_pending();
    loco.set_speed(speed);
    loco.set_direction(direction);

    if !had_pending {
        return Reconciliation::Idle;
    }
    if is_emergency_stop(speed_byte) {
        let direction = loco.pending_direction();
        loco.set_pending_state(0, direction, false);
        return Reconciliation::EmergencyStop;
    }
    if speed == loco.pending_speed() && direction == loco.pending_direction() {
        loco.clear_pending();
        return Reconciliation::CaughtUp;
    }
    Reconciliation::Stale
}

/// Quiet-interval gate for the coalescer flush.
#[derive(Debug, Default)]
pub(crate) struct Coalescer {
    last_change_ms: Option<u64>,
}

impl Coalescer {
    /// Record a user intent at `now_ms`; re-arms the quiet interval.
    pub(crate) fn note_change(&mut self, now_ms: u64) {
        self.last_change_ms = Some(now_ms);
    }

    /// Whether the quiet interval has elapsed since the last intent.
    pub(crate) fn due(&self, now_ms: u64, interval_ms: u64) -> bool {
        match self.last_change_ms {
            Some(last) => now_ms.saturating_sub(last) >= interval_ms,
            None => false,
        }
    }

    /// Disarm after a flush.
    pub(crate) fn reset(&mut self) {
        self.last_change_ms = None;
    }
}

/// Tracks the last outbound frame time for heartbeat emission.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    last_send_ms: Option<u64>,
}

impl Heartbeat {
    /// Any successful send defers the next heartbeat.
    pub(crate) fn note_send(&mut self, now_ms: u64) {
        self.last_send_ms = Some(now_ms);
    }

    /// Whether a heartbeat frame is owed at `now_ms`.
    pub(crate) fn due(&self, now_ms: u64, interval_ms: u64) -> bool {
        match self.last_send_ms {
            Some(last) => now_ms.saturating_sub(last) >= interval_ms,
            // Nothing sent yet; the first send anchors the timer.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocoSource;
    use crate::parsing::encode_speed_byte;

    fn loco() -> Loco {
        Loco::new(42, LocoSource::Local).unwrap()
    }

    // =========================================================================
    // Intent buffering
    // =========================================================================

    #[test]
    fn intent_sets_flag_when_different() {
        let mut loco = loco();
        set_pending(&mut loco, 10, Direction::Forward);
        assert!(loco.has_pending());
        assert_eq!(loco.pending_speed(), 10);
        assert_eq!(loco.pending_direction(), Direction::Forward);
    }

    #[test]
    fn noop_intent_is_suppressed() {
        let mut loco = loco();
        // Fresh loco is stopped, forward
        set_pending(&mut loco, 0, Direction::Forward);
        assert!(!loco.has_pending());
    }

    #[test]
    fn noop_intent_clears_previous_flag() {
        let mut loco = loco();
        set_pending(&mut loco, 10, Direction::Forward);
        set_pending(&mut loco, 0, Direction::Forward);
        assert!(!loco.has_pending());
    }

    #[test]
    fn direction_only_change_pends() {
        let mut loco = loco();
        set_pending(&mut loco, 0, Direction::Reverse);
        assert!(loco.has_pending());
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    #[test]
    fn matching_broadcast_clears_flag() {
        let mut loco = loco();
        set_pending(&mut loco, 10, Direction::Reverse);
        let byte = encode_speed_byte(10, Direction::Reverse);
        assert_eq!(reconcile(&mut loco, byte), Reconciliation::CaughtUp);
        assert!(!loco.has_pending());
        assert_eq!(loco.speed(), 10);
        assert_eq!(loco.direction(), Direction::Reverse);
    }

    #[test]
    fn stale_broadcast_keeps_intent() {
        let mut loco = loco();
        set_pending(&mut loco, 30, Direction::Forward);
        let byte = encode_speed_byte(10, Direction::Forward);
        assert_eq!(reconcile(&mut loco, byte), Reconciliation::Stale);
        assert!(loco.has_pending());
        assert_eq!(loco.pending_speed(), 30);
        // Acknowledged state still moved
        assert_eq!(loco.speed(), 10);
    }

    #[test]
    fn emergency_stop_discards_intent() {
        let mut loco = loco();
        set_pending(&mut loco, 30, Direction::Reverse);
        assert_eq!(reconcile(&mut loco, 129), Reconciliation::EmergencyStop);
        assert!(!loco.has_pending());
        assert_eq!(loco.pending_speed(), 0);
        // Pending direction untouched
        assert_eq!(loco.pending_direction(), Direction::Reverse);
    }

    #[test]
    fn broadcast_without_intent_just_updates() {
        let mut loco = loco();
        let byte = encode_speed_byte(20, Direction::Forward);
        assert_eq!(reconcile(&mut loco, byte), Reconciliation::Idle);
        assert_eq!(loco.speed(), 20);
        assert!(!loco.has_pending());
    }

    // =========================================================================
    // Timers
    // =========================================================================

    #[test]
    fn coalescer_waits_for_quiet_interval() {
        let mut coalescer = Coalescer::default();
        assert!(!coalescer.due(1_000, 100));
        coalescer.note_change(1_000);
        assert!(!coalescer.due(1_050, 100));
        assert!(coalescer.due(1_100, 100));
        coalescer.reset();
        assert!(!coalescer.due(2_000, 100));
    }

    #[test]
    fn later_change_rearms_interval() {
        let mut coalescer = Coalescer::default();
        coalescer.note_change(1_000);
        coalescer.note_change(1_090);
        assert!(!coalescer.due(1_100, 100));
        assert!(coalescer.due(1_190, 100));
    }

    #[test]
    fn heartbeat_deferred_by_sends() {
        let mut heartbeat = Heartbeat::default();
        heartbeat.note_send(0);
        assert!(!heartbeat.due(59_999, 60_000));
        assert!(heartbeat.due(60_000, 60_000));
        heartbeat.note_send(30_000);
        assert!(!heartbeat.due(60_000, 60_000));
        assert!(heartbeat.due(90_000, 60_000));
    }
}
