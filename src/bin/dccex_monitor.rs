//! Connects to a command station and prints everything it announces.
//!
//! Usage: `dccex_monitor <host:port>` (DCC-EX listens on port 2560 by
//! default).

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use rs_dccex::traits::Delegate;
use rs_dccex::{DccExClient, Loco, TcpTransport, TrackMode, TrackPower};

struct PrintingDelegate;

impl Delegate for PrintingDelegate {
    fn received_server_version(&mut self, major: u16, minor: u16, patch: u16) {
        println!("server version {}.{}.{}", major, minor, patch);
    }

    fn received_message(&mut self, message: &str) {
        println!("message: {}", message);
    }

    fn received_track_power(&mut self, power: TrackPower) {
        println!("track power: {:?}", power);
    }

    fn received_individual_track_power(&mut self, power: TrackPower, track: i32) {
        println!("track power: {:?} (track token {})", power, track);
    }

    fn received_track_type(&mut self, track: char, mode: TrackMode, address: Option<i32>) {
        match address {
            Some(address) => println!("track {}: {:?} (address {})", track, mode, address),
            None => println!("track {}: {:?}", track, mode),
        }
    }

    fn received_loco_update(&mut self, loco: &Loco) {
        println!(
            "loco {}: speed {} {:?} functions {:#07x}",
            loco.address(),
            loco.speed(),
            loco.direction(),
            loco.function_states()
        );
    }

    fn received_roster_list(&mut self) {
        println!("roster received");
    }

    fn received_turnout_list(&mut self) {
        println!("turnouts received");
    }

    fn received_route_list(&mut self) {
        println!("routes received");
    }

    fn received_turntable_list(&mut self) {
        println!("turntables received");
    }

    fn received_lists(&mut self) {
        println!("inventory complete");
    }

    fn received_turnout_action(&mut self, id: i32, thrown: bool) {
        println!("turnout {}: {}", id, if thrown { "thrown" } else { "closed" });
    }

    fn received_turntable_action(&mut self, id: i32, index: i32, moving: bool) {
        println!(
            "turntable {}: index {}{}",
            id,
            index,
            if moving { " (moving)" } else { "" }
        );
    }

    fn received_consist_update(&mut self, lead: u16) {
        println!("consist update, lead {}", lead);
    }

    fn received_fast_clock(&mut self, minutes: i32, rate: i32) {
        println!("fast clock: {:02}:{:02} rate {}", minutes / 60, minutes % 60, rate);
    }
}

fn main() -> Result<()> {
    let addr = match env::args().nth(1) {
        Some(addr) => addr,
        None => bail!("usage: dccex_monitor <host:port>"),
    };

    let transport = TcpTransport::connect(&addr)
        .with_context(|| format!("connecting to {}", addr))?;
    let mut client = DccExClient::new(transport, PrintingDelegate);
    println!("connected to {}", addr);

    let started = Instant::now();
    client.request_server_version(0)?;
    client.request_lists(true, true, true, true);

    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        client.tick(now_ms).context("transport failed")?;
        thread::sleep(Duration::from_millis(10));
    }
}
