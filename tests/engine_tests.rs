//! End-to-end engine tests over a scripted transport.

use rs_dccex::hal::MockTransport;
use rs_dccex::traits::Delegate;
use rs_dccex::{Config, DccExClient, Direction, Loco, TrackMode, TrackPower};

/// Delegate that records every callback as a readable event string.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Delegate for Recorder {
    fn received_server_version(&mut self, major: u16, minor: u16, patch: u16) {
        self.events.push(format!("version {}.{}.{}", major, minor, patch));
    }

    fn received_message(&mut self, message: &str) {
        self.events.push(format!("message {}", message));
    }

    fn received_screen_update(&mut self, screen: i32, row: i32, text: &str) {
        self.events.push(format!("screen {} {} {}", screen, row, text));
    }

    fn received_track_power(&mut self, power: TrackPower) {
        self.events.push(format!("power {:?}", power));
    }

    fn received_individual_track_power(&mut self, power: TrackPower, track: i32) {
        self.events.push(format!("track-power {:?} {}", power, track));
    }

    fn received_track_type(&mut self, track: char, mode: TrackMode, address: Option<i32>) {
        self.events
            .push(format!("track-type {} {:?} {:?}", track, mode, address));
    }

    fn received_loco_update(&mut self, loco: &Loco) {
        self.events.push(format!(
            "loco {} {} {:?}",
            loco.address(),
            loco.speed(),
            loco.direction()
        ));
    }

    fn received_roster_list(&mut self) {
        self.events.push("roster-list".into());
    }

    fn received_turnout_list(&mut self) {
        self.events.push("turnout-list".into());
    }

    fn received_route_list(&mut self) {
        self.events.push("route-list".into());
    }

    fn received_turntable_list(&mut self) {
        self.events.push("turntable-list".into());
    }

    fn received_lists(&mut self) {
        self.events.push("lists".into());
    }

    fn received_turnout_action(&mut self, id: i32, thrown: bool) {
        self.events.push(format!("turnout {} {}", id, thrown));
    }

    fn received_turntable_action(&mut self, id: i32, index: i32, moving: bool) {
        self.events
            .push(format!("turntable {} {} {}", id, index, moving));
    }

    fn received_consist_update(&mut self, lead: u16) {
        self.events.push(format!("consist {}", lead));
    }

    fn received_fast_clock(&mut self, minutes: i32, rate: i32) {
        self.events.push(format!("clock {} {}", minutes, rate));
    }
}

type Client = DccExClient<MockTransport, Recorder>;

fn client() -> Client {
    DccExClient::new(MockTransport::new(), Recorder::default())
}

fn feed(client: &mut Client, frame: &str, now_ms: u64) {
    client.transport_mut().queue(frame.as_bytes());
    client.tick(now_ms).unwrap();
}

fn sent(client: &mut Client) -> Vec<String> {
    let frames = client.transport_mut().sent_frames();
    client.transport_mut().clear_sent();
    frames
}

fn events(client: &mut Client) -> Vec<String> {
    std::mem::take(&mut client.delegate_mut().events)
}

// =============================================================================
// Version banner
// =============================================================================

#[test]
fn version_banner_end_to_end() {
    let mut client = client();
    feed(
        &mut client,
        "<iDCCEX V-1.2.3-smartass / MEGA / STANDARD_MOTOR_SHIELD / 7>",
        0,
    );
    assert!(client.received_version());
    assert_eq!(client.version(), Some((1, 2, 3)));
    assert_eq!(events(&mut client), ["version 1.2.3"]);
}

#[test]
fn version_variants() {
    for (banner, expected) in [
        ("<iDCCEX V-0.0.0 / MEGA / STANDARD_MOTOR_SHIELD / 7>", (0, 0, 0)),
        ("<iDCCEX V-92.210.10 / MEGA / STANDARD_MOTOR_SHIELD / 7>", (92, 210, 10)),
    ] {
        let mut client = client();
        feed(&mut client, banner, 0);
        assert_eq!(client.version(), Some(expected));
    }
}

// =============================================================================
// Throttle coalescing and reconciliation
// =============================================================================

#[test]
fn rapid_intents_coalesce_to_one_frame() {
    let mut client = client();
    client.set_throttle(42, 10, Direction::Forward, 0);
    client.tick(50).unwrap();
    client.set_throttle(42, 20, Direction::Forward, 50);
    client.set_throttle(42, 30, Direction::Forward, 50);
    client.tick(150).unwrap();
    assert_eq!(sent(&mut client), ["<t 42 30 1>"]);
    // Nothing further on later ticks
    client.tick(500).unwrap();
    assert!(sent(&mut client).is_empty());
}

#[test]
fn matching_broadcast_clears_pending() {
    let mut client = client();
    client.set_throttle(42, 10, Direction::Reverse, 0);
    client.tick(100).unwrap();
    assert_eq!(sent(&mut client), ["<t 42 10 0>"]);
    // speedByte 11 decodes to speed 10 reverse
    feed(&mut client, "<l 42 0 11 0>", 150);
    let loco = client.model().loco(42).unwrap();
    assert!(!loco.has_pending());
    assert_eq!(loco.speed(), 10);
    client.tick(500).unwrap();
    assert!(sent(&mut client).is_empty());
}

#[test]
fn stale_broadcast_keeps_intent_for_flush() {
    let mut client = client();
    client.set_throttle(42, 30, Direction::Forward, 0);
    // Stale broadcast arrives inside the quiet interval
    feed(&mut client, "<l 42 0 11 0>", 50);
    assert!(client.model().loco(42).unwrap().has_pending());
    client.tick(100).unwrap();
    assert_eq!(sent(&mut client), ["<t 42 30 1>"]);
}

#[test]
fn emergency_stop_discards_intent_without_frame() {
    let mut client = client();
    client.set_throttle(42, 10, Direction::Reverse, 0);
    // Server emergency stop before the flush
    feed(&mut client, "<l 42 0 129 0>", 50);
    let loco = client.model().loco(42).unwrap();
    assert!(!loco.has_pending());
    assert_eq!(loco.pending_speed(), 0);
    assert_eq!(loco.pending_direction(), Direction::Reverse);
    client.tick(200).unwrap();
    assert!(sent(&mut client).is_empty());
}

// =============================================================================
// Inventory fetches
// =============================================================================

#[test]
fn roster_walk() {
    let mut client = client();
    client.request_lists(true, false, false, false);
    client.tick(0).unwrap();
    assert_eq!(sent(&mut client), ["<J R>"]);

    feed(&mut client, "<jR 42 9>", 10);
    assert_eq!(sent(&mut client), ["<J R 42>"]);

    feed(&mut client, "<jR 42 \"L42\" \"F42\">", 20);
    assert_eq!(sent(&mut client), ["<J R 9>"]);

    feed(&mut client, "<jR 9 \"L9\" \"F9\">", 30);
    assert!(client.received_lists());
    assert!(events(&mut client).ends_with(&["roster-list".into(), "lists".into()]));

    let loco = client.model().roster_loco(42).unwrap();
    assert_eq!(loco.name(), Some("L42"));
    assert_eq!(loco.function_name(0), Some("F42"));
}

#[test]
fn empty_roster_completes() {
    let mut client = client();
    client.request_lists(true, false, false, false);
    client.tick(0).unwrap();
    feed(&mut client, "<jR>", 10);
    assert!(client.received_lists());
    assert!(client.model().roster.is_empty());
}

#[test]
fn turnout_and_route_walk_is_sequential() {
    let mut client = client();
    client.request_lists(false, true, true, false);
    client.tick(0).unwrap();
    assert_eq!(sent(&mut client), ["<J T>"]);

    feed(&mut client, "<jT 100 200>", 10);
    assert_eq!(sent(&mut client), ["<J T 100>"]);
    feed(&mut client, "<jT 100 1 \"Yard entry\">", 20);
    assert_eq!(sent(&mut client), ["<J T 200>"]);
    feed(&mut client, "<jT 200 0 \"Main crossover\">", 30);
    // Turnouts done; route list starts in the same tick
    assert_eq!(sent(&mut client), ["<J A>"]);

    feed(&mut client, "<jA 300>", 40);
    assert_eq!(sent(&mut client), ["<J A 300>"]);
    feed(&mut client, "<jA 300 A \"Shuttle\">", 50);
    assert!(client.received_lists());

    assert!(client.model().turnout(100).unwrap().thrown());
    assert!(!client.model().turnout(200).unwrap().thrown());
    assert_eq!(
        client.model().route(300).unwrap().description(),
        Some("Shuttle")
    );
}

#[test]
fn turntable_walk_with_index_phase() {
    let mut client = client();
    client.request_lists(false, false, false, true);
    client.tick(0).unwrap();
    assert_eq!(sent(&mut client), ["<J O>"]);

    feed(&mut client, "<jO 1>", 10);
    assert_eq!(sent(&mut client), ["<J O 1>"]);

    feed(&mut client, "<jO 1 1 0 2 \"Loco shed\">", 20);
    assert_eq!(sent(&mut client), ["<J P 1>"]);

    // Index frames arrive one by one; no re-request in between
    feed(&mut client, "<jP 1 0 0 \"\">", 30);
    assert!(sent(&mut client).is_empty());
    assert!(!client.received_lists());

    feed(&mut client, "<jP 1 1 900 \"Road 1\">", 40);
    assert!(client.received_lists());

    let tt = client.model().turntable(1).unwrap();
    assert!(tt.is_fully_received());
    assert_eq!(tt.index(0).unwrap().name(), "Home");
    assert_eq!(tt.index(1).unwrap().name(), "Road 1");
    assert_eq!(tt.index(1).unwrap().angle(), 900);
}

// =============================================================================
// CS-consists
// =============================================================================

#[test]
fn consist_broadcast_reassigns_addresses() {
    let mut client = client();
    feed(&mut client, "<^ 5 6>", 0);
    feed(&mut client, "<^ 25 26>", 0);
    assert_eq!(events(&mut client), ["consist 5", "consist 25"]);

    feed(&mut client, "<^ 42 -5 25>", 0);
    assert_eq!(events(&mut client), ["consist 42"]);

    let consists = client.model().consists.consists();
    let new = client.model().consists.by_lead(42).unwrap();
    assert_eq!(
        new.members()
            .iter()
            .map(|m| m.signed_address())
            .collect::<Vec<_>>(),
        [42, -5, 25]
    );
    // 5 and 25 are gone from their former consists
    for consist in consists {
        if consist.lead() != Some(42) {
            assert!(!consist.contains(5));
            assert!(!consist.contains(25));
        }
    }
}

#[test]
fn single_member_consist_broadcast_is_ignored() {
    let mut client = client();
    // One loco is not a consist: no registry entry, no callback
    feed(&mut client, "<^ 42>", 0);
    assert!(events(&mut client).is_empty());
    assert!(client.model().consists.consists().is_empty());
}

#[test]
fn single_member_broadcast_does_not_dismember_existing_consist() {
    let mut client = client();
    feed(&mut client, "<^ 7 42>", 0);
    assert_eq!(events(&mut client), ["consist 7"]);

    feed(&mut client, "<^ 42>", 0);
    assert!(events(&mut client).is_empty());
    let consist = client.model().consists.by_lead(7).unwrap();
    assert!(consist.is_valid());
    assert!(consist.contains(42));
}

#[test]
fn local_consist_lifecycle_emits_definitions() {
    let mut client = client();
    assert!(client.create_cs_consist(42, false));
    assert!(client.add_cs_consist_member(42, 5, true, 0).unwrap());
    assert!(client.add_cs_consist_member(42, 25, false, 0).unwrap());
    assert_eq!(sent(&mut client), ["<^ 42 -5>", "<^ 42 -5 25>"]);

    // Still valid after removal: re-defined
    assert!(client.remove_cs_consist_member(42, 25, 0).unwrap());
    assert_eq!(sent(&mut client), ["<^ 42 -5>"]);

    // Below two members: deleted
    assert!(client.remove_cs_consist_member(42, 5, 0).unwrap());
    assert_eq!(sent(&mut client), ["<^ 42>"]);
    assert!(client.model().consists.by_lead(42).is_none());
}

// =============================================================================
// Broadcast handling and resync
// =============================================================================

#[test]
fn power_broadcasts() {
    let mut client = client();
    feed(&mut client, "<p1>", 0);
    feed(&mut client, "<p0 MAIN>", 0);
    feed(&mut client, "<p1 A>", 0);
    let events = events(&mut client);
    assert_eq!(events[0], "power On");
    // MAIN raises both the per-track and the global callback
    assert!(events[1].starts_with("track-power Off"));
    assert_eq!(events[2], "power Off");
    assert_eq!(events[3], format!("track-power On {}", b'A'));
}

#[test]
fn turnout_broadcast_updates_model_and_notifies() {
    let mut client = client();
    client.request_lists(false, true, false, false);
    client.tick(0).unwrap();
    feed(&mut client, "<jT 100>", 0);
    feed(&mut client, "<jT 100 0 \"Yard\">", 0);
    events(&mut client);

    feed(&mut client, "<H 100 1>", 0);
    assert!(client.model().turnout(100).unwrap().thrown());
    assert_eq!(events(&mut client), ["turnout 100 true"]);
}

#[test]
fn garbage_between_frames_is_survived() {
    let mut client = client();
    client.transport_mut().queue(b"\r\nnoise!!<p1>garbage<p0>");
    client.tick(0).unwrap();
    let events = events(&mut client);
    assert_eq!(events, ["power On", "power Off"]);
}

#[test]
fn screen_and_message_broadcasts() {
    let mut client = client();
    feed(&mut client, "<m \"Layout power restored\">", 0);
    feed(&mut client, "<@ 0 2 \"Track A: 1.2A\">", 0);
    assert_eq!(
        events(&mut client),
        ["message Layout power restored", "screen 0 2 Track A: 1.2A"]
    );
}

#[test]
fn track_mode_broadcast() {
    let mut client = client();
    feed(&mut client, "<= A MAIN>", 0);
    feed(&mut client, "<= B DC 42>", 0);
    assert_eq!(
        events(&mut client),
        ["track-type A Main None", "track-type B Dc Some(42)"]
    );
}

// =============================================================================
// Heartbeat
// =============================================================================

#[test]
fn heartbeat_with_custom_interval() {
    let config = Config::default().with_heartbeat(5_000);
    let mut client = DccExClient::with_config(MockTransport::new(), Recorder::default(), config);
    client.request_server_version(0).unwrap();
    client.tick(4_999).unwrap();
    assert_eq!(sent(&mut client), ["<s>"]);
    client.tick(5_000).unwrap();
    assert_eq!(sent(&mut client), ["<#>"]);
    // The heartbeat itself re-anchors the timer
    client.tick(9_000).unwrap();
    assert!(sent(&mut client).is_empty());
}
