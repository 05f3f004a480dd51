//! Wire protocol
//!
//! JSON-framed message types for the bidirectional real-time connection, one
//! per client. `ClientMessage`/`ServerMessage` use externally tagged enums
//! (`#[serde(tag = "type")]`) so the wire format stays self-describing and
//! forward-compatible with new variants, mirroring the teacher's framing.

use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, SessionId};
use crate::graph::Difficulty;
use crate::session::Mode;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Handshake message, sent once before any other frame on a fresh connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    /// Bearer token issued by the external identity provider.
    pub token: String,
}

/// Messages a client may send once authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join the matchmaking queue at a given difficulty.
    #[serde(rename_all = "camelCase")]
    JoinQueue {
        /// Requested difficulty.
        difficulty: Difficulty,
    },
    /// Leave the matchmaking queue.
    LeaveQueue,
    /// Start a single-player session immediately, bypassing the queue.
    #[serde(rename_all = "camelCase")]
    StartSinglePlayerGame {
        /// Requested difficulty.
        difficulty: Difficulty,
    },
    /// Signal readiness for a multiplayer session still in `waiting`.
    #[serde(rename_all = "camelCase")]
    PlayerReady {
        /// Session this readiness applies to.
        session_id: SessionId,
    },
    /// Submit a candidate path from the session's start player to its end player.
    #[serde(rename_all = "camelCase")]
    SubmitPath {
        /// Session this submission applies to.
        session_id: SessionId,
        /// Candidate node sequence, start to end.
        path: Vec<PlayerId>,
    },
    /// Forfeit the session.
    #[serde(rename_all = "camelCase")]
    GiveUp {
        /// Session being forfeited.
        session_id: SessionId,
    },
    /// Latency probe, echoed back as `pong`.
    #[serde(rename_all = "camelCase")]
    Ping {
        /// Client-supplied timestamp, echoed verbatim.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Result of the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    /// Whether the token validated.
    pub success: bool,
    /// The bound user identity, if successful.
    pub user_id: Option<String>,
    /// Human-readable failure reason, if unsuccessful.
    pub error: Option<String>,
    /// Server version, for client compatibility checks.
    pub server_version: String,
}

/// A graph node as surfaced to clients: identity plus display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Graph identity.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

/// Reasons a session can reach its terminal `gameEnd` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEndReason {
    /// A participant submitted a valid path.
    PathFound,
    /// A participant exhausted their strike budget.
    OutOfStrikes,
    /// The wall-clock deadline elapsed with no winner.
    Timeout,
    /// The receiving participant forfeited.
    GaveUp,
    /// The opponent forfeited.
    OpponentGaveUp,
    /// The opponent's channel closed before the game otherwise ended.
    OpponentDisconnected,
    /// An unrecoverable engine error forced termination.
    InternalError,
}

/// Error codes for the `error` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame didn't parse or referenced an event the server doesn't support.
    MalformedFrame,
    /// A frame other than `authenticate` arrived before the channel authenticated.
    NotAuthenticated,
    /// Handshake token failed validation.
    AuthFailed,
    /// `session_id` on an inbound frame doesn't name a session this channel is in.
    UnknownSession,
    /// Channel is already queued.
    AlreadyQueued,
    /// Channel has no queue entry to leave.
    NotQueued,
    /// Server-side failure unrelated to client input.
    InternalError,
}

/// Messages the server may send to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake outcome.
    AuthResult(AuthResult),
    /// A session has been created for this channel; play can begin (single)
    /// or readiness can be signaled (multiplayer).
    #[serde(rename_all = "camelCase")]
    GameStart {
        /// Newly created session.
        session_id: SessionId,
        /// Chosen start node.
        start_player: PlayerSummary,
        /// Chosen end node.
        end_player: PlayerSummary,
        /// Session mode.
        mode: Mode,
        /// Session difficulty.
        difficulty: Difficulty,
        /// The opponent's user id, in multiplayer.
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent_user_id: Option<String>,
    },
    /// The other participant signaled readiness.
    OpponentReady,
    /// Both participants are ready; the countdown has begun and the session
    /// is now active.
    AllPlayersReady,
    /// An invalid submission was rejected.
    #[serde(rename_all = "camelCase")]
    InvalidPath {
        /// Length (node count) of the rejected submission.
        path_length: usize,
        /// Strikes left after this rejection, in multiplayer and single alike.
        #[serde(skip_serializing_if = "Option::is_none")]
        strikes_remaining: Option<u32>,
    },
    /// The opponent attempted (and failed) a submission.
    #[serde(rename_all = "camelCase")]
    OpponentAttemptedPath {
        /// Always `false`; only failed attempts are reported to the opponent.
        success: bool,
        /// Length (node count) of the opponent's submission.
        path_length: usize,
    },
    /// Terminal frame for a session.
    #[serde(rename_all = "camelCase")]
    GameEnd {
        /// Winning user, if any.
        winner_user_id: Option<String>,
        /// Why the session ended.
        reason: GameEndReason,
        /// The winner's submitted path, mapped to display names.
        #[serde(skip_serializing_if = "Option::is_none")]
        winning_path: Option<Vec<String>>,
        /// Alternative shortest solutions, mapped to display names.
        #[serde(skip_serializing_if = "Option::is_none")]
        solution_paths: Option<Vec<Vec<String>>>,
        /// Single-player score.
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<i64>,
        /// Elapsed seconds, single-player only.
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
    },
    /// A `ClientProtocol` failure the client can recover from without
    /// tearing down the channel.
    Error {
        /// Failure category.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
    /// Reply to a `ping` frame.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock time, milliseconds since epoch.
        server_time: u64,
    },
    /// Sent to every connected channel immediately before a graceful shutdown.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Parse a client frame from its JSON wire representation.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize a server frame to its JSON wire representation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Difficulty;

    #[test]
    fn client_message_join_queue_roundtrip() {
        let msg = ClientMessage::JoinQueue { difficulty: Difficulty::Medium };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();
        match parsed {
            ClientMessage::JoinQueue { difficulty } => assert_eq!(difficulty, Difficulty::Medium),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn client_message_submit_path_roundtrip() {
        let msg = ClientMessage::SubmitPath {
            session_id: SessionId::new(),
            path: vec![PlayerId::new("a"), PlayerId::new("b")],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();
        match parsed {
            ClientMessage::SubmitPath { path, .. } => assert_eq!(path.len(), 2),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_message_game_end_serializes_absent_fields() {
        let msg = ServerMessage::GameEnd {
            winner_user_id: Some("u1".into()),
            reason: GameEndReason::PathFound,
            winning_path: Some(vec!["Alice".into(), "Bob".into()]),
            solution_paths: None,
            score: None,
            time: None,
        };
        let json = msg.to_json().unwrap();
        assert!(!json.contains("solutionPaths"));
        assert!(json.contains("pathFound") || json.contains("path_found"));
    }

    #[test]
    fn error_code_round_trips() {
        let msg = ServerMessage::Error {
            code: ErrorCode::UnknownSession,
            message: "no such session".into(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("unknown_session") || json.contains("unknownSession"));
    }

    #[test]
    fn game_end_reason_variants_serialize_distinctly() {
        let reasons = [
            GameEndReason::PathFound,
            GameEndReason::OutOfStrikes,
            GameEndReason::Timeout,
            GameEndReason::GaveUp,
            GameEndReason::OpponentGaveUp,
            GameEndReason::OpponentDisconnected,
            GameEndReason::InternalError,
        ];
        let mut seen = std::collections::HashSet::new();
        for reason in reasons {
            let json = serde_json::to_string(&reason).unwrap();
            assert!(seen.insert(json));
        }
    }
}
