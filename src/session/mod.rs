//! Session Engine (C5): per-session state machine plus the registry that
//! owns every live session and orchestrates its I/O-bearing transitions.

pub mod engine;
pub mod manager;

pub use engine::{InvalidOutcome, Mode, Participant, ReadyOutcome, Session, Status};
pub use manager::{SessionError, SessionManager};
