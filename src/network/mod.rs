//! Transport and wire-protocol layer.
//!
//! Everything above the WebSocket socket itself — JWT validation, JSON
//! framing, connection bookkeeping — lives here. Game logic runs entirely
//! through `session` and `matchmaking`; this layer only translates between
//! the wire and their APIs.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{
    AuthResult, AuthenticateRequest, ClientMessage, ErrorCode, GameEndReason, PlayerSummary,
    ServerMessage,
};
pub use server::{GameServer, ServerError};
