//! Shared primitives used across the matchmaking and session engine.

pub mod ids;
pub mod rng;

pub use ids::{ChannelId, PlayerId, SessionId, UserId};
pub use rng::DeterministicRng;
