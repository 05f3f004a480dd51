//! # gridiron-relay
//!
//! Real-time matchmaking and session server for a two-sided graph
//! pathfinding game: players race to trace a connection path between two
//! endpoints drawn from a shared graph of player connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       GRIDIRON RELAY                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/          - Identifiers, deterministic PRNG            │
//! │  graph/         - Graph Store, Pathfinder, Endpoint Picker   │
//! │  matchmaking/   - Queue and pairing                          │
//! │  session/       - Session Engine and Session Manager         │
//! │  stats/         - Idempotent stats persistence               │
//! │  config/        - Environment-driven settings                │
//! │  network/       - JWT auth, wire protocol, WebSocket adapter │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Matches are solvable by construction: the Endpoint Picker only ever
//! hands a session two endpoints already known to have a path within the
//! hop bound, so a `gameEnd` without a winner means a participant ran out
//! of time or strikes, not that the round was unsolvable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod graph;
pub mod matchmaking;
pub mod network;
pub mod session;
pub mod stats;

pub use config::{ConfigError, Settings};
pub use core::{ChannelId, DeterministicRng, PlayerId, SessionId, UserId};
pub use graph::{Difficulty, GraphStore};
pub use matchmaking::Matchmaker;
pub use network::server::{GameServer, ServerError};
pub use session::SessionManager;
pub use stats::StatsWriter;

/// Crate version, surfaced to clients in the `authResult` frame.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
