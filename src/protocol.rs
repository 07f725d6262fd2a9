//! The protocol engine: inbound dispatch, the tick loop, and the outbound
//! command API.
//!
//! Everything runs synchronously inside [`DccExClient::tick`]: transport
//! bytes are framed and dispatched, the inventory machine advances at most
//! one fetch, buffered throttle intents flush once their quiet interval has
//! elapsed, and the heartbeat fires if nothing else was sent. Delegate
//! callbacks fire from inside the same call; the delegate must not
//! reentrantly drive the engine.
//!
//! Malformed or unrecognized inbound frames are logged and dropped; the
//! engine never fails on bad input. The only errors that propagate are
//! transport errors.

use crate::commands::CommandBuffer;
use crate::config::{Config, MAX_FUNCTION_NUMBER, MAX_SPEED};
use crate::framer::Framer;
use crate::inventory::{Inventory, ListKind, Request, Step};
use crate::model::{Consist, CsConsistRegistry, Direction, Facing, Loco, LocoSource, Model, Route, RouteKind, Turnout, Turntable, TurntableIndex, TurntableType};
use crate::parsing::parse_version_banner;
use crate::throttle::{self, Coalescer, Heartbeat};
use crate::tokenizer::{Frame, KW_DC, KW_DCX, KW_MAIN, KW_NONE, KW_PROG};
use crate::traits::{Delegate, Transport};

use alloc::vec::Vec;

/// Track power state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrackPower {
    /// Track output disabled.
    Off,
    /// Track output enabled.
    On,
}

/// Operating mode of a track output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrackMode {
    /// DCC main track.
    Main,
    /// DCC programming track.
    Prog,
    /// DC output for the given loco address.
    Dc,
    /// Reverse-polarity DC output.
    Dcx,
    /// Track disabled.
    None,
}

/// Momentum shaping algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MomentumAlgorithm {
    /// Constant acceleration.
    Linear,
    /// Speed-proportional acceleration.
    Power,
}

// Single-letter list discriminants in `j` replies
const TOKEN_R: i32 = b'R' as i32;
const TOKEN_T: i32 = b'T' as i32;
const TOKEN_A: i32 = b'A' as i32;
const TOKEN_O: i32 = b'O' as i32;
const TOKEN_P: i32 = b'P' as i32;
const TOKEN_C: i32 = b'C' as i32;

/// Client engine for a DCC-EX command station.
///
/// Generic over the byte [`Transport`] below it and the [`Delegate`]
/// receiving notifications above it. All timing is driven by the `now_ms`
/// values the application passes in; the engine never reads a clock.
pub struct DccExClient<T: Transport, D: Delegate> {
    transport: T,
    delegate: D,
    config: Config,
    model: Model,
    framer: Framer,
    outbound: CommandBuffer,
    inventory: Inventory,
    coalescer: Coalescer,
    heartbeat: Heartbeat,
    version: Option<(u16, u16, u16)>,
    last_server_response_ms: Option<u64>,
    fast_clock: Option<(i32, i32)>,
}

impl<T: Transport, D: Delegate> DccExClient<T, D> {
    /// Create an engine with default configuration.
    pub fn new(transport: T, delegate: D) -> Self {
        Self::with_config(transport, delegate, Config::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(transport: T, delegate: D, config: Config) -> Self {
        Self {
            transport,
            delegate,
            config,
            model: Model::new(),
            framer: Framer::new(),
            outbound: CommandBuffer::new(),
            inventory: Inventory::new(),
            coalescer: Coalescer::default(),
            heartbeat: Heartbeat::default(),
            version: None,
            last_server_response_ms: None,
            fast_clock: None,
        }
    }

    // ------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------

    /// The local entity model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The CS-consist registry, for configuration and local consist building.
    pub fn consists_mut(&mut self) -> &mut CsConsistRegistry {
        &mut self.model.consists
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The delegate.
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Mutable access to the delegate.
    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    /// Whether a complete version banner has been received.
    pub fn received_version(&self) -> bool {
        self.version.is_some()
    }

    /// Server version as (major, minor, patch), if received.
    pub fn version(&self) -> Option<(u16, u16, u16)> {
        self.version
    }

    /// Server major version.
    pub fn version_major(&self) -> Option<u16> {
        self.version.map(|v| v.0)
    }

    /// Server minor version.
    pub fn version_minor(&self) -> Option<u16> {
        self.version.map(|v| v.1)
    }

    /// Server patch version.
    pub fn version_patch(&self) -> Option<u16> {
        self.version.map(|v| v.2)
    }

    /// Timestamp of the last inbound frame, in the caller's `now_ms`
    /// timeline. The engine applies no timeout itself; link-dead policy is
    /// the application's.
    pub fn last_server_response_ms(&self) -> Option<u64> {
        self.last_server_response_ms
    }

    /// Last fast clock state as (minutes since midnight, rate).
    pub fn fast_clock(&self) -> Option<(i32, i32)> {
        self.fast_clock
    }

    /// Whether every requested inventory list has been fully fetched.
    pub fn received_lists(&self) -> bool {
        self.inventory.received_lists()
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Drive the engine: read and dispatch inbound frames, advance the
    /// inventory fetch, flush due throttle intents, emit the heartbeat.
    ///
    /// Call this from the application main loop with a monotonic millisecond
    /// clock. All delegate callbacks fire from inside this call.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), T::Error> {
        while let Some(byte) = self.transport.read_byte()? {
            if self.framer.push(byte) {
                let raw = self.framer.take_frame();
                self.process_frame(&raw, now_ms);
            }
        }

        self.advance_inventory(now_ms)?;

        if self.coalescer.due(now_ms, self.config.flush_interval_ms) {
            self.flush_throttles(now_ms)?;
            self.coalescer.reset();
        }

        if self.config.heartbeat_enabled
            && self.heartbeat.due(now_ms, self.config.heartbeat_interval_ms)
        {
            self.outbound.begin('#');
            self.transmit(now_ms)?;
        }

        Ok(())
    }

    fn advance_inventory(&mut self, now_ms: u64) -> Result<(), T::Error> {
        loop {
            match self.inventory.advance(&self.model) {
                Some(Step::Send(request)) => {
                    self.send_fetch(request, now_ms)?;
                    return Ok(());
                }
                Some(Step::ListComplete(kind)) => match kind {
                    ListKind::Roster => self.delegate.received_roster_list(),
                    ListKind::Turnouts => self.delegate.received_turnout_list(),
                    ListKind::Routes => self.delegate.received_route_list(),
                    ListKind::Turntables => self.delegate.received_turntable_list(),
                },
                Some(Step::AllComplete) => self.delegate.received_lists(),
                None => return Ok(()),
            }
        }
    }

    fn send_fetch(&mut self, request: Request, now_ms: u64) -> Result<(), T::Error> {
        match request {
            Request::RosterList => {
                self.model.clear_roster();
                self.outbound.begin('J').append_str("R");
            }
            Request::RosterDetail(address) => {
                self.outbound.begin('J').append_str("R").append_number(address as i32);
            }
            Request::TurnoutList => {
                self.model.clear_turnouts();
                self.outbound.begin('J').append_str("T");
            }
            Request::TurnoutDetail(id) => {
                self.outbound.begin('J').append_str("T").append_number(id);
            }
            Request::RouteList => {
                self.model.clear_routes();
                self.outbound.begin('J').append_str("A");
            }
            Request::RouteDetail(id) => {
                self.outbound.begin('J').append_str("A").append_number(id);
            }
            Request::TurntableList => {
                self.model.clear_turntables();
                self.outbound.begin('J').append_str("O");
            }
            Request::TurntableDetail(id) => {
                self.outbound.begin('J').append_str("O").append_number(id);
            }
            Request::TurntableIndexes(id) => {
                self.outbound.begin('J').append_str("P").append_number(id);
            }
        }
        self.transmit(now_ms)
    }

    fn flush_throttles(&mut self, now_ms: u64) -> Result<(), T::Error> {
        let mut intents: Vec<(u16, u8, Direction)> = Vec::new();
        for loco in self
            .model
            .roster
            .iter()
            .chain(self.model.local_locos.iter())
        {
            if loco.has_pending() {
                intents.push((loco.address(), loco.pending_speed(), loco.pending_direction()));
            }
        }
        for (address, speed, direction) in intents {
            self.outbound
                .begin('t')
                .append_number(address as i32)
                .append_number(speed as i32)
                .append_number(direction.wire_code());
            // The intent stays buffered until the frame actually goes out,
            // so a write failure retries on the next flush.
            if self.try_transmit(now_ms)? {
                if let Some(loco) = self.model.loco_mut(address) {
                    loco.clear_pending();
                }
            }
        }
        Ok(())
    }

    /// Finalize the scratch buffer and write it; any successful write
    /// re-anchors the heartbeat timer. Returns whether a frame went out.
    fn try_transmit(&mut self, now_ms: u64) -> Result<bool, T::Error> {
        match self.outbound.finalize() {
            Some(frame) => {
                log::debug!("tx {}", frame);
                self.transport.write(frame.as_bytes())?;
                self.heartbeat.note_send(now_ms);
                Ok(true)
            }
            None => {
                log::warn!("outbound frame overflowed scratch buffer, dropped");
                Ok(false)
            }
        }
    }

    fn transmit(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.try_transmit(now_ms).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn process_frame(&mut self, raw: &[u8], now_ms: u64) {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(error) => {
                log::debug!("dropping malformed frame: {:?}", error);
                return;
            }
        };
        if let Ok(text) = core::str::from_utf8(raw) {
            log::trace!("rx {}", text.trim());
        }
        self.last_server_response_ms = Some(now_ms);

        match frame.opcode() {
            b'i' => self.handle_server_info(&frame),
            b'm' => {
                if let Some(message) = frame.text(0) {
                    self.delegate.received_message(message);
                }
            }
            b'@' => self.handle_screen_update(&frame),
            b'p' => self.handle_power(&frame),
            b'=' => self.handle_track_mode(&frame),
            b'l' => self.handle_loco_update(&frame),
            b'j' => self.handle_inventory_reply(&frame),
            b'H' => self.handle_turnout_broadcast(&frame),
            b'I' => self.handle_turntable_broadcast(&frame),
            b'r' => {
                if frame.param_count() == 1 {
                    if let Some(address) = frame.number(0) {
                        self.delegate.received_read_loco(address);
                    }
                }
            }
            b'w' => match (frame.number(0), frame.number(1), frame.param_count()) {
                (Some(address), None, 1) => self.delegate.received_write_loco(address),
                (Some(cv), Some(value), 2) => self.delegate.received_write_cv(cv, value),
                _ => {}
            },
            b'v' => match (frame.number(0), frame.number(1), frame.number(2)) {
                (Some(cv), Some(value), None) => self.delegate.received_validate_cv(cv, value),
                (Some(cv), Some(bit), Some(value)) => {
                    self.delegate.received_validate_cv_bit(cv, bit, value)
                }
                _ => {}
            },
            b'^' => self.handle_consist_broadcast(&frame),
            other => log::trace!("ignoring opcode {}", other as char),
        }
    }

    fn handle_server_info(&mut self, frame: &Frame) {
        let Some(banner) = frame.text(0) else { return };
        if let Some((major, minor, patch)) = parse_version_banner(banner) {
            self.version = Some((major, minor, patch));
            self.delegate.received_server_version(major, minor, patch);
        } else {
            log::debug!("server banner without parsable version: {}", banner);
        }
    }

    fn handle_screen_update(&mut self, frame: &Frame) {
        let (Some(screen), Some(row), Some(text)) =
            (frame.number(0), frame.number(1), frame.text(2))
        else {
            return;
        };
        self.delegate.received_screen_update(screen, row, text);
    }

    fn handle_power(&mut self, frame: &Frame) {
        let power = match frame.number(0) {
            Some(0) => TrackPower::Off,
            Some(1) => TrackPower::On,
            _ => return,
        };
        match frame.number(1) {
            None => self.delegate.received_track_power(power),
            Some(track) => {
                self.delegate.received_individual_track_power(power, track);
                if track == KW_MAIN {
                    self.delegate.received_track_power(power);
                }
            }
        }
    }

    fn handle_track_mode(&mut self, frame: &Frame) {
        let (Some(track), Some(mode_token)) = (frame.number(0), frame.number(1)) else {
            return;
        };
        // Track designators are single letters, which hash to their ASCII code
        let track = match u8::try_from(track) {
            Ok(letter @ b'A'..=b'Z') => letter as char,
            _ => return,
        };
        let mode = match mode_token {
            t if t == KW_MAIN => TrackMode::Main,
            t if t == KW_PROG => TrackMode::Prog,
            t if t == KW_DC => TrackMode::Dc,
            t if t == KW_DCX => TrackMode::Dcx,
            t if t == KW_NONE => TrackMode::None,
            _ => return,
        };
        self.delegate.received_track_type(track, mode, frame.number(2));
    }

    fn handle_loco_update(&mut self, frame: &Frame) {
        if frame.param_count() < 4 || !frame.all_numbers() {
            return;
        }
        let (Some(address), Some(speed_byte), Some(function_map)) =
            (frame.number(0), frame.number(2), frame.number(3))
        else {
            return;
        };
        let Ok(address) = u16::try_from(address) else { return };
        if !(0..=255).contains(&speed_byte) {
            return;
        }
        let Some(loco) = self.model.loco_mut(address) else {
            // Not a loco we track; broadcasts for unknown addresses are noise
            return;
        };
        throttle::reconcile(loco, speed_byte as u8);
        loco.set_function_states(function_map as u32);
        if let Some(loco) = self.model.loco(address) {
            self.delegate.received_loco_update(loco);
        }
    }

    fn handle_turnout_broadcast(&mut self, frame: &Frame) {
        let (Some(id), Some(thrown)) = (frame.number(0), frame.number(1)) else {
            return;
        };
        let thrown = thrown != 0;
        if let Some(turnout) = self.model.turnout_mut(id) {
            turnout.set_thrown(thrown);
        }
        self.delegate.received_turnout_action(id, thrown);
    }

    fn handle_turntable_broadcast(&mut self, frame: &Frame) {
        let (Some(id), Some(index), Some(moving)) =
            (frame.number(0), frame.number(1), frame.number(2))
        else {
            return;
        };
        let moving = moving != 0;
        if let Some(turntable) = self.model.turntable_mut(id) {
            turntable.set_position(index, moving);
        }
        self.delegate.received_turntable_action(id, index, moving);
    }

    fn handle_consist_broadcast(&mut self, frame: &Frame) {
        if !frame.all_numbers() || frame.param_count() == 0 {
            return;
        }
        let mut members: Vec<i32> = Vec::with_capacity(frame.param_count());
        for i in 0..frame.param_count() {
            if let Some(n) = frame.number(i) {
                members.push(n);
            }
        }
        if let Some(lead) = self.model.consists.receive_definition(&members) {
            self.delegate.received_consist_update(lead);
        }
    }

    // ------------------------------------------------------------------
    // Inventory replies (opcode j, discriminated by the leading letter)
    // ------------------------------------------------------------------

    fn handle_inventory_reply(&mut self, frame: &Frame) {
        match frame.number(0) {
            Some(TOKEN_R) => self.handle_roster_reply(frame),
            Some(TOKEN_T) => self.handle_turnout_reply(frame),
            Some(TOKEN_A) => self.handle_route_reply(frame),
            Some(TOKEN_O) => self.handle_turntable_reply(frame),
            Some(TOKEN_P) => self.handle_turntable_index_reply(frame),
            Some(TOKEN_C) => self.handle_fast_clock(frame),
            _ => {}
        }
    }

    fn handle_roster_reply(&mut self, frame: &Frame) {
        if frame.param_count() == 4 && frame.is_text(2) && frame.is_text(3) {
            // Detail: <jR id "name" "function labels">
            let (Some(address), Some(name), Some(labels)) =
                (frame.number(1), frame.text(2), frame.text(3))
            else {
                return;
            };
            let Ok(address) = u16::try_from(address) else { return };
            if let Some(loco) = self.model.loco_mut(address) {
                loco.set_name(name);
                loco.set_function_labels(labels);
            }
            self.inventory.note_progress(&self.model);
        } else if frame.all_numbers() {
            // Id list: <jR id id ...>, possibly empty
            for i in 1..frame.param_count() {
                let Some(id) = frame.number(i) else { continue };
                let Ok(address) = u16::try_from(id) else { continue };
                if self.model.roster_loco(address).is_none() {
                    if let Some(loco) = Loco::new(address, LocoSource::Roster) {
                        self.model.roster.push(loco);
                    }
                }
            }
            self.inventory.list_received(ListKind::Roster);
        }
    }

    fn handle_turnout_reply(&mut self, frame: &Frame) {
        if frame.param_count() == 4 && frame.is_text(3) {
            // Detail: <jT id state "description">
            let (Some(id), Some(state), Some(description)) =
                (frame.number(1), frame.number(2), frame.text(3))
            else {
                return;
            };
            let thrown = state == 1 || state == TOKEN_T;
            if let Some(turnout) = self.model.turnout_mut(id) {
                turnout.set_thrown(thrown);
                turnout.set_description(description);
            }
            self.inventory.note_progress(&self.model);
        } else if frame.all_numbers() {
            for i in 1..frame.param_count() {
                let Some(id) = frame.number(i) else { continue };
                if self.model.turnout(id).is_none() {
                    self.model.turnouts.push(Turnout::new(id));
                }
            }
            self.inventory.list_received(ListKind::Turnouts);
        }
    }

    fn handle_route_reply(&mut self, frame: &Frame) {
        if frame.param_count() == 4 && frame.is_text(3) {
            // Detail: <jA id type "description">
            let (Some(id), Some(kind), Some(description)) =
                (frame.number(1), frame.number(2), frame.text(3))
            else {
                return;
            };
            let kind = match kind {
                t if t == TOKEN_R => RouteKind::Route,
                t if t == TOKEN_A => RouteKind::Automation,
                _ => RouteKind::Unknown,
            };
            if let Some(route) = self.model.route_mut(id) {
                route.set_kind(kind);
                route.set_description(description);
            }
            self.inventory.note_progress(&self.model);
        } else if frame.all_numbers() {
            for i in 1..frame.param_count() {
                let Some(id) = frame.number(i) else { continue };
                if self.model.route(id).is_none() {
                    self.model.routes.push(Route::new(id));
                }
            }
            self.inventory.list_received(ListKind::Routes);
        }
    }

    fn handle_turntable_reply(&mut self, frame: &Frame) {
        if frame.param_count() == 6 && frame.is_text(5) {
            // Descriptor: <jO id type position index-count "description">
            let (Some(id), Some(ttype), Some(position), Some(count), Some(description)) = (
                frame.number(1),
                frame.number(2),
                frame.number(3),
                frame.number(4),
                frame.text(5),
            ) else {
                return;
            };
            let ttype = TurntableType::from_wire(ttype);
            let Ok(count) = usize::try_from(count) else { return };
            if let Some(turntable) = self.model.turntable_mut(id) {
                turntable.set_descriptor(ttype, position, count, description);
            }
            self.inventory.note_progress(&self.model);
        } else if frame.all_numbers() {
            for i in 1..frame.param_count() {
                let Some(id) = frame.number(i) else { continue };
                if self.model.turntable(id).is_none() {
                    self.model.turntables.push(Turntable::new(id));
                }
            }
            self.inventory.list_received(ListKind::Turntables);
        }
    }

    fn handle_turntable_index_reply(&mut self, frame: &Frame) {
        // <jP turntable-id index angle "name">, one frame per index
        let (Some(id), Some(index), Some(angle), Some(name)) = (
            frame.number(1),
            frame.number(2),
            frame.number(3),
            frame.text(4),
        ) else {
            return;
        };
        if let Some(turntable) = self.model.turntable_mut(id) {
            if turntable.index(index).is_none() {
                turntable.add_index(TurntableIndex::new(index, angle, name));
            }
        }
        self.inventory.note_progress(&self.model);
    }

    fn handle_fast_clock(&mut self, frame: &Frame) {
        let Some(minutes) = frame.number(1) else { return };
        let rate = frame
            .number(2)
            .or_else(|| self.fast_clock.map(|(_, r)| r))
            .unwrap_or(0);
        self.fast_clock = Some((minutes, rate));
        self.delegate.received_fast_clock(minutes, rate);
    }

    // ------------------------------------------------------------------
    // Outbound API: server and power
    // ------------------------------------------------------------------

    /// Request the version banner: `<s>`.
    pub fn request_server_version(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('s');
        self.transmit(now_ms)
    }

    /// Global emergency stop: `<!>`.
    pub fn emergency_stop_all(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('!');
        self.transmit(now_ms)
    }

    /// All-track power: `<1>` / `<0>`.
    pub fn set_power(&mut self, power: TrackPower, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin(Self::power_opcode(power));
        self.transmit(now_ms)
    }

    /// Main-track power: `<1 MAIN>` / `<0 MAIN>`.
    pub fn set_main_power(&mut self, power: TrackPower, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin(Self::power_opcode(power)).append_str("MAIN");
        self.transmit(now_ms)
    }

    /// Programming-track power: `<1 PROG>` / `<0 PROG>`.
    pub fn set_prog_power(&mut self, power: TrackPower, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin(Self::power_opcode(power)).append_str("PROG");
        self.transmit(now_ms)
    }

    /// Power a single track letter: `<1 X>` / `<0 X>`.
    pub fn set_track_power(
        &mut self,
        power: TrackPower,
        track: char,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin(Self::power_opcode(power))
            .append_char(' ')
            .append_char(track);
        self.transmit(now_ms)
    }

    /// Join the programming track to main: `<1 JOIN>`.
    pub fn join_prog_track(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('1').append_str("JOIN");
        self.transmit(now_ms)
    }

    fn power_opcode(power: TrackPower) -> char {
        match power {
            TrackPower::On => '1',
            TrackPower::Off => '0',
        }
    }

    /// Assign a track's operating mode: `<= X MAIN>`, `<= X DC addr>`, ...
    ///
    /// `address` is required for [`TrackMode::Dc`] and [`TrackMode::Dcx`]
    /// and ignored otherwise.
    pub fn set_track_mode(
        &mut self,
        track: char,
        mode: TrackMode,
        address: Option<u16>,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        let keyword = match mode {
            TrackMode::Main => "MAIN",
            TrackMode::Prog => "PROG",
            TrackMode::Dc => "DC",
            TrackMode::Dcx => "DCX",
            TrackMode::None => "NONE",
        };
        let needs_address = matches!(mode, TrackMode::Dc | TrackMode::Dcx);
        if needs_address && address.is_none() {
            return Ok(());
        }
        self.outbound
            .begin('=')
            .append_char(' ')
            .append_char(track)
            .append_str(keyword);
        if needs_address {
            if let Some(address) = address {
                self.outbound.append_number(address as i32);
            }
        }
        self.transmit(now_ms)
    }

    // ------------------------------------------------------------------
    // Outbound API: throttle and functions
    // ------------------------------------------------------------------

    /// Buffer a throttle intent for a locomotive.
    ///
    /// Nothing is transmitted here: the latest intent per loco is released
    /// as one `<t addr speed dir>` frame on the first tick after the quiet
    /// interval elapses. Driving an address not in the roster creates a
    /// local loco entry so later broadcasts for it reconcile.
    pub fn set_throttle(&mut self, address: u16, speed: u8, direction: Direction, now_ms: u64) {
        if self.model.loco(address).is_none() {
            match Loco::new(address, LocoSource::Local) {
                Some(loco) => self.model.local_locos.push(loco),
                None => return,
            }
        }
        // Lookup cannot fail now
        if let Some(loco) = self.model.loco_mut(address) {
            throttle::set_pending(loco, speed.min(MAX_SPEED), direction);
        }
        self.coalescer.note_change(now_ms);
    }

    /// Buffer a throttle intent for every member of an application-side
    /// consist, flipping direction for reversed-facing members.
    pub fn set_consist_throttle(
        &mut self,
        consist: &Consist,
        speed: u8,
        direction: Direction,
        now_ms: u64,
    ) {
        for member in consist.members() {
            let member_direction = match member.facing {
                Facing::Forward => direction,
                Facing::Reversed => direction.flipped(),
            };
            self.set_throttle(member.address, speed, member_direction, now_ms);
        }
    }

    /// Buffer a throttle intent for a CS-consist: only the lead is
    /// addressed; the command station drives the rest.
    pub fn set_cs_consist_throttle(
        &mut self,
        lead: u16,
        speed: u8,
        direction: Direction,
        now_ms: u64,
    ) {
        self.set_throttle(lead, speed, direction, now_ms);
    }

    /// Set a function: `<F addr fn state>`.
    ///
    /// If `address` leads a valid CS-consist with function replication on,
    /// the frame is re-sent for every other member.
    pub fn set_function(
        &mut self,
        address: u16,
        function: u8,
        on: bool,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        if function > MAX_FUNCTION_NUMBER {
            return Ok(());
        }
        let mut targets: Vec<u16> = Vec::new();
        targets.push(address);
        if let Some(consist) = self.model.consists.by_lead(address) {
            if consist.is_valid() && consist.replicate_functions() {
                targets.extend(
                    consist
                        .members()
                        .iter()
                        .skip(1)
                        .map(|m| m.address),
                );
            }
        }
        for target in targets {
            self.outbound
                .begin('F')
                .append_number(target as i32)
                .append_number(function as i32)
                .append_number(if on { 1 } else { 0 });
            self.transmit(now_ms)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outbound API: turnouts, routes, turntables, accessories
    // ------------------------------------------------------------------

    /// Throw a turnout: `<T id 1>`.
    pub fn throw_turnout(&mut self, id: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('T').append_number(id).append_number(1);
        self.transmit(now_ms)
    }

    /// Close a turnout: `<T id 0>`.
    pub fn close_turnout(&mut self, id: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('T').append_number(id).append_number(0);
        self.transmit(now_ms)
    }

    /// Flip a turnout based on its locally tracked state.
    pub fn toggle_turnout(&mut self, id: i32, now_ms: u64) -> Result<(), T::Error> {
        let thrown = match self.model.turnout(id) {
            Some(turnout) => turnout.thrown(),
            None => return Ok(()),
        };
        if thrown {
            self.close_turnout(id, now_ms)
        } else {
            self.throw_turnout(id, now_ms)
        }
    }

    /// Start a route: `</ START id>`.
    pub fn start_route(&mut self, id: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('/').append_str("START").append_number(id);
        self.transmit(now_ms)
    }

    /// Hand a locomotive to an automation: `</ START addr id>`.
    pub fn start_automation(
        &mut self,
        address: u16,
        id: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('/')
            .append_str("START")
            .append_number(address as i32)
            .append_number(id);
        self.transmit(now_ms)
    }

    /// Pause all routes: `</ PAUSE>`.
    pub fn pause_routes(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('/').append_str("PAUSE");
        self.transmit(now_ms)
    }

    /// Resume all routes: `</ RESUME>`.
    pub fn resume_routes(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('/').append_str("RESUME");
        self.transmit(now_ms)
    }

    /// Rotate a turntable: `<I id position [activity]>`.
    pub fn rotate_turntable(
        &mut self,
        id: i32,
        position: i32,
        activity: Option<i32>,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound.begin('I').append_number(id).append_number(position);
        if let Some(activity) = activity {
            self.outbound.append_number(activity);
        }
        self.transmit(now_ms)
    }

    /// Drive an accessory by linear address: `<a addr state>`.
    pub fn activate_accessory(
        &mut self,
        address: i32,
        activate: bool,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('a')
            .append_number(address)
            .append_number(if activate { 1 } else { 0 });
        self.transmit(now_ms)
    }

    /// Drive an accessory by address and sub-address: `<a addr sub state>`.
    pub fn activate_accessory_pair(
        &mut self,
        address: i32,
        sub_address: i32,
        activate: bool,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('a')
            .append_number(address)
            .append_number(sub_address)
            .append_number(if activate { 1 } else { 0 });
        self.transmit(now_ms)
    }

    // ------------------------------------------------------------------
    // Outbound API: programming
    // ------------------------------------------------------------------

    /// Read the loco address on the programming track: `<R>`.
    pub fn read_loco(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('R');
        self.transmit(now_ms)
    }

    /// Read a CV on the programming track: `<R cv>`.
    pub fn read_cv(&mut self, cv: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('R').append_number(cv);
        self.transmit(now_ms)
    }

    /// Validate a CV value: `<V cv value>`.
    pub fn validate_cv(&mut self, cv: i32, value: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('V').append_number(cv).append_number(value);
        self.transmit(now_ms)
    }

    /// Validate one CV bit: `<V cv bit value>`.
    pub fn validate_cv_bit(
        &mut self,
        cv: i32,
        bit: i32,
        value: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('V')
            .append_number(cv)
            .append_number(bit)
            .append_number(value);
        self.transmit(now_ms)
    }

    /// Write the loco address on the programming track: `<W addr>`.
    pub fn write_loco_address(&mut self, address: u16, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('W').append_number(address as i32);
        self.transmit(now_ms)
    }

    /// Write a CV on the programming track: `<W cv value>`.
    pub fn write_cv(&mut self, cv: i32, value: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('W').append_number(cv).append_number(value);
        self.transmit(now_ms)
    }

    /// Write one CV bit on the programming track: `<B cv bit value>`.
    pub fn write_cv_bit(
        &mut self,
        cv: i32,
        bit: i32,
        value: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('B')
            .append_number(cv)
            .append_number(bit)
            .append_number(value);
        self.transmit(now_ms)
    }

    /// Write a CV on the main track: `<w addr cv value>`.
    pub fn write_cv_on_main(
        &mut self,
        address: u16,
        cv: i32,
        value: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('w')
            .append_number(address as i32)
            .append_number(cv)
            .append_number(value);
        self.transmit(now_ms)
    }

    /// Write one CV bit on the main track: `<b addr cv bit value>`.
    pub fn write_cv_bit_on_main(
        &mut self,
        address: u16,
        cv: i32,
        bit: i32,
        value: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('b')
            .append_number(address as i32)
            .append_number(cv)
            .append_number(bit)
            .append_number(value);
        self.transmit(now_ms)
    }

    // ------------------------------------------------------------------
    // Outbound API: inventory, clock, gauges, momentum
    // ------------------------------------------------------------------

    /// Start fetching the selected inventory lists.
    ///
    /// The fetch runs across subsequent [`tick`](Self::tick) calls: lists in
    /// order, one detail request in flight at a time. List-complete delegate
    /// callbacks fire as each finishes.
    pub fn request_lists(&mut self, roster: bool, turnouts: bool, routes: bool, turntables: bool) {
        self.inventory.request_lists(roster, turnouts, routes, turntables);
    }

    /// Request the track current gauge descriptors: `<J G>`.
    pub fn request_current_gauges(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('J').append_str("G");
        self.transmit(now_ms)
    }

    /// Request the instantaneous track currents: `<J I>`.
    pub fn request_currents(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('J').append_str("I");
        self.transmit(now_ms)
    }

    /// Request the fast clock: `<J C>`.
    pub fn request_fast_clock(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('J').append_str("C");
        self.transmit(now_ms)
    }

    /// Set the fast clock: `<J C minutes rate>`.
    pub fn set_fast_clock(
        &mut self,
        minutes: i32,
        rate: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('J')
            .append_str("C")
            .append_number(minutes)
            .append_number(rate);
        self.transmit(now_ms)
    }

    /// Select the momentum algorithm: `<m LINEAR>` / `<m POWER>`.
    pub fn set_momentum_algorithm(
        &mut self,
        algorithm: MomentumAlgorithm,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        let keyword = match algorithm {
            MomentumAlgorithm::Linear => "LINEAR",
            MomentumAlgorithm::Power => "POWER",
        };
        self.outbound.begin('m').append_str(keyword);
        self.transmit(now_ms)
    }

    /// Set a loco's momentum: `<m addr value>`. Address 0 sets the default.
    pub fn set_momentum(&mut self, address: u16, value: i32, now_ms: u64) -> Result<(), T::Error> {
        self.outbound
            .begin('m')
            .append_number(address as i32)
            .append_number(value);
        self.transmit(now_ms)
    }

    /// Set separate acceleration and braking momentum: `<m addr accel decel>`.
    pub fn set_momentum_pair(
        &mut self,
        address: u16,
        accel: i32,
        decel: i32,
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound
            .begin('m')
            .append_number(address as i32)
            .append_number(accel)
            .append_number(decel);
        self.transmit(now_ms)
    }

    // ------------------------------------------------------------------
    // Outbound API: CS-consists
    // ------------------------------------------------------------------

    /// Ask the server for its existing consist definitions: `<^>`.
    ///
    /// Each definition comes back as a `<^ a b ...>` broadcast and hydrates
    /// the registry.
    pub fn request_cs_consists(&mut self, now_ms: u64) -> Result<(), T::Error> {
        self.outbound.begin('^');
        self.transmit(now_ms)
    }

    /// Start a CS-consist with a lead locomotive. Nothing is transmitted
    /// until the consist gains a second member.
    ///
    /// Returns `false` if the address is invalid or already a member of
    /// another consist; returns `true` if a consist with this lead already
    /// exists.
    pub fn create_cs_consist(&mut self, lead: u16, reversed: bool) -> bool {
        self.model.consists.create(lead, reversed).is_some()
    }

    /// Add a member to a CS-consist. When the consist is (or stays) valid,
    /// the full definition `<^ a b ...>` is transmitted.
    pub fn add_cs_consist_member(
        &mut self,
        lead: u16,
        address: u16,
        reversed: bool,
        now_ms: u64,
    ) -> Result<bool, T::Error> {
        if self.model.consists.consist_containing(address).is_some() {
            return Ok(false);
        }
        let Some(consist) = self.model.consists.by_lead_mut(lead) else {
            return Ok(false);
        };
        if !consist.add_member(address, reversed) {
            return Ok(false);
        }
        if consist.is_valid() {
            consist.set_created_on_server(true);
            let members: Vec<i32> = consist.members().iter().map(|m| m.signed_address()).collect();
            self.send_consist_definition(&members, now_ms)?;
        }
        Ok(true)
    }

    /// Remove a member from a CS-consist.
    ///
    /// A still-valid consist is re-defined on the server; dropping below two
    /// members deletes the consist on the server and locally.
    pub fn remove_cs_consist_member(
        &mut self,
        lead: u16,
        address: u16,
        now_ms: u64,
    ) -> Result<bool, T::Error> {
        let Some(consist) = self.model.consists.by_lead_mut(lead) else {
            return Ok(false);
        };
        let was_valid = consist.is_valid();
        if !consist.remove_member(address) {
            return Ok(false);
        }
        let still_valid = consist.is_valid();
        let members: Vec<i32> = consist.members().iter().map(|m| m.signed_address()).collect();
        let remaining_lead = consist.lead();
        if !still_valid {
            consist.set_pending_deletion(true);
        }

        if still_valid {
            if was_valid {
                // The server keys the consist by its lead; removing the lead
                // re-homes it, so the old entry must be deleted first.
                if address == lead {
                    self.outbound.begin('^').append_number(lead as i32);
                    self.transmit(now_ms)?;
                }
                self.send_consist_definition(&members, now_ms)?;
            }
        } else if was_valid {
            self.outbound.begin('^').append_number(lead as i32);
            self.transmit(now_ms)?;
            if let Some(remaining) = remaining_lead {
                self.model.consists.remove_by_lead(remaining);
            }
        }
        Ok(true)
    }

    /// Delete a CS-consist on the server and locally: `<^ lead>`.
    pub fn delete_cs_consist(&mut self, lead: u16, now_ms: u64) -> Result<bool, T::Error> {
        let Some(consist) = self.model.consists.by_lead_mut(lead) else {
            return Ok(false);
        };
        consist.set_pending_deletion(true);
        self.outbound.begin('^').append_number(lead as i32);
        self.transmit(now_ms)?;
        self.model.consists.remove_by_lead(lead);
        Ok(true)
    }

    fn send_consist_definition(
        &mut self,
        signed_members: &[i32],
        now_ms: u64,
    ) -> Result<(), T::Error> {
        self.outbound.begin('^');
        for &member in signed_members {
            self.outbound.append_number(member);
        }
        self.transmit(now_ms)
    }
}
