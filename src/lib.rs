//! # rs-dccex
//!
//! A client library for the DCC-EX command station native `<...>` text
//! protocol: drive locomotives, turnouts, routes, and turntables over any
//! byte transport.
//!
//! ## Features
//!
//! - **Sans-IO engine**: the application supplies the transport and a
//!   millisecond clock; everything runs synchronously inside `tick`
//! - **Inventory hydration**: roster, turnouts, routes, and turntables are
//!   fetched sequentially with one detail request in flight at a time
//! - **Throttle coalescing**: rapid speed-knob input collapses to a single
//!   throttle frame per quiet interval, reconciled against server broadcasts
//! - **CS-consists**: command-station consists with membership invariants
//!   and optional client-side function replication
//! - **`no_std` capable**: bounded `heapless` buffers throughout; `std` is
//!   only needed for the TCP transport
//!
//! ## Architecture
//!
//! - `tokenizer` / `framer` - wire syntax in
//! - `commands` - wire syntax out, through one bounded scratch buffer
//! - `model` - locomotives, turnouts, routes, turntables, CS-consists
//! - `inventory` / `throttle` - the fetch and coalescing state machines
//! - `protocol` - the engine tying it all together
//! - `traits` - the `Transport` below and the `Delegate` above
//! - `hal` - mock transport for tests, TCP transport for `std`
//!
//! ## Example
//!
//! ```rust
//! use rs_dccex::{DccExClient, Direction, hal::MockTransport, traits::delegate::NullDelegate};
//!
//! let mut client = DccExClient::new(MockTransport::new(), NullDelegate);
//!
//! // Ask for the version banner and the full inventory
//! client.request_server_version(0).unwrap();
//! client.request_lists(true, true, true, true);
//!
//! // Buffer a throttle intent; it flushes after the quiet interval
//! client.set_throttle(42, 30, Direction::Forward, 0);
//!
//! // Drive from the main loop with a monotonic millisecond clock
//! client.tick(100).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Outbound frame construction through a bounded scratch buffer.
pub mod commands;
/// Protocol limits and timing configuration.
pub mod config;
/// Inbound byte accumulation and frame delimiting.
pub mod framer;
/// Transport implementations: mock for testing, TCP for `std`.
pub mod hal;
/// Sequenced inventory fetching (roster, turnouts, routes, turntables).
pub mod inventory;
/// Local entity model hydrated from the command station.
pub mod model;
/// Version banner, speed byte, and function label parsing.
pub mod parsing;
/// The protocol engine: dispatch, tick loop, outbound API.
pub mod protocol;
/// Throttle intent coalescing and heartbeat timing.
pub mod throttle;
/// Frame tokenizing and keyword hashing.
pub mod tokenizer;
/// The `Transport` and `Delegate` trait seams.
pub mod traits;

// Re-exports for convenience
pub use config::Config;
pub use inventory::ListKind;
pub use model::{
    Consist, ConsistMember, CsConsist, CsConsistMember, CsConsistRegistry, Direction, Facing,
    Loco, LocoSource, Model, Route, RouteKind, Turnout, Turntable, TurntableIndex, TurntableType,
};
pub use protocol::{DccExClient, MomentumAlgorithm, TrackMode, TrackPower};
pub use tokenizer::{Frame, Param, TokenizeError};
pub use traits::{Delegate, Transport};

#[cfg(feature = "std")]
pub use hal::TcpTransport;
