//! Session Engine (C5) — per-session state.
//!
//! A [`Session`] is the single piece of mutable state shared by one
//! (single-player) or two (multiplayer) concurrent participants. It is never
//! mutated directly from more than one place at a time: [`super::manager::SessionManager`]
//! guards every session behind its own `tokio::sync::Mutex`, so the session's
//! own methods can assume exclusive access and focus purely on the state
//! machine (waiting -> active -> finished) and the frames each transition
//! emits.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{ChannelId, PlayerId, SessionId, UserId};
use crate::graph::{ConnectionType, Difficulty};
use crate::network::protocol::{GameEndReason, PlayerSummary, ServerMessage};

/// Whether a session seats one participant or two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One participant, no readiness phase, no timeout.
    Single,
    /// Two participants, readiness phase, wall-clock timeout.
    Multiplayer,
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Multiplayer only: participants attached, waiting for both ready.
    Waiting,
    /// Accepting `SubmitPath`/`GiveUp`; multiplayer timeout is armed.
    Active,
    /// Terminal. Further inputs are ignored.
    Finished,
}

/// One seat in a session.
pub struct Participant {
    pub user: UserId,
    pub channel: ChannelId,
    sender: mpsc::Sender<ServerMessage>,
    ready: bool,
    /// Set once `gameStart` has been sent; guards the "at most one
    /// gameStart emission per participant" invariant.
    game_start_sent: bool,
    /// Set once a terminal frame has been sent; guards the "exactly one
    /// terminal emission per participant, last frame delivered" invariant.
    terminal_sent: bool,
}

impl Participant {
    pub fn new(user: UserId, channel: ChannelId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            user,
            channel,
            sender,
            ready: false,
            game_start_sent: false,
            terminal_sent: false,
        }
    }

    async fn send(&self, msg: ServerMessage) {
        if self.sender.send(msg).await.is_err() {
            debug!(user = %self.user, "dropped frame: channel gone");
        }
    }
}

/// Outcome of a `Ready` input, for the manager to decide whether to cancel
/// or schedule anything further.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Session wasn't waiting on readiness (wrong state, or already ready).
    NoChange,
    /// This participant is now ready; the other isn't yet.
    Acknowledged,
    /// Both participants are now ready; session has moved to `active`.
    AllReady,
}

/// Outcome of an invalid submission.
#[derive(Debug, PartialEq, Eq)]
pub enum InvalidOutcome {
    /// Session wasn't active; input ignored.
    NoChange,
    /// Strike deducted, session still active.
    StillActive { strikes_remaining: u32 },
    /// Strike budget exhausted; session has moved to `finished`.
    OutOfStrikes,
}

/// Per-session mutable state, owned by the session registry and guarded by
/// a single lock (see [`super::manager::SessionManager`]).
pub struct Session {
    pub id: SessionId,
    pub mode: Mode,
    pub difficulty: Difficulty,
    allowed_types: HashSet<ConnectionType>,
    pub start_player: PlayerId,
    pub end_player: PlayerId,
    participants: Vec<Participant>,
    status: Status,
    strikes_remaining: u32,
    pub start_epoch: Instant,
    pub winner_user_id: Option<UserId>,
}

impl Session {
    /// Build a multiplayer session in `waiting`, both participants unready.
    #[allow(clippy::too_many_arguments)]
    pub fn new_multiplayer(
        id: SessionId,
        difficulty: Difficulty,
        start_player: PlayerId,
        end_player: PlayerId,
        first: Participant,
        second: Participant,
    ) -> Self {
        Self {
            id,
            mode: Mode::Multiplayer,
            difficulty,
            allowed_types: difficulty.allowed_types(),
            start_player,
            end_player,
            participants: vec![first, second],
            status: Status::Waiting,
            strikes_remaining: difficulty.strike_budget(),
            start_epoch: Instant::now(),
            winner_user_id: None,
        }
    }

    /// Build a single-player session, already `active`.
    pub fn new_single(
        id: SessionId,
        difficulty: Difficulty,
        start_player: PlayerId,
        end_player: PlayerId,
        solo: Participant,
    ) -> Self {
        Self {
            id,
            mode: Mode::Single,
            difficulty,
            allowed_types: difficulty.allowed_types(),
            start_player,
            end_player,
            participants: vec![solo],
            status: Status::Active,
            strikes_remaining: difficulty.strike_budget(),
            start_epoch: Instant::now(),
            winner_user_id: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn allowed_types(&self) -> &HashSet<ConnectionType> {
        &self.allowed_types
    }

    pub fn min_edges(&self) -> usize {
        self.difficulty.min_edges()
    }

    pub fn strikes_remaining(&self) -> u32 {
        self.strikes_remaining
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.participants.iter().map(|p| p.channel).collect()
    }

    fn participant(&self, channel: ChannelId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.channel == channel)
    }

    fn participant_mut(&mut self, channel: ChannelId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.channel == channel)
    }

    fn other(&self, channel: ChannelId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.channel != channel)
    }

    /// Whether `channel` names a participant of this session.
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        self.participant(channel).is_some()
    }

    pub fn user_for(&self, channel: ChannelId) -> Option<UserId> {
        self.participant(channel).map(|p| p.user.clone())
    }

    /// Send the `gameStart` frame to every participant. No-op for a
    /// participant that has already received it.
    pub async fn emit_game_start(
        &mut self,
        start_summary: PlayerSummary,
        end_summary: PlayerSummary,
    ) {
        let opponent_user_id = |mine: ChannelId, parts: &[Participant]| {
            parts
                .iter()
                .find(|p| p.channel != mine)
                .map(|p| p.user.to_string())
        };
        let snapshot: Vec<(ChannelId, Option<String>)> = self
            .participants
            .iter()
            .map(|p| (p.channel, opponent_user_id(p.channel, &self.participants)))
            .collect();

        for (channel, opponent_user_id) in snapshot {
            let participant = self.participant_mut(channel).unwrap();
            if participant.game_start_sent {
                continue;
            }
            participant.game_start_sent = true;
            let msg = ServerMessage::GameStart {
                session_id: self.id,
                start_player: start_summary.clone(),
                end_player: end_summary.clone(),
                mode: self.mode,
                difficulty: self.difficulty,
                opponent_user_id,
            };
            self.participant(channel).unwrap().send(msg).await;
        }
    }

    /// Apply a `Ready` input from `channel`.
    pub async fn ready(&mut self, channel: ChannelId) -> ReadyOutcome {
        if self.status != Status::Waiting {
            return ReadyOutcome::NoChange;
        }
        let Some(participant) = self.participant_mut(channel) else {
            return ReadyOutcome::NoChange;
        };
        if participant.ready {
            return ReadyOutcome::NoChange;
        }
        participant.ready = true;

        if self.participants.iter().all(|p| p.ready) {
            self.status = Status::Active;
            self.start_epoch = Instant::now();
            for p in &self.participants {
                p.send(ServerMessage::AllPlayersReady).await;
            }
            ReadyOutcome::AllReady
        } else if let Some(other) = self.other(channel) {
            other.send(ServerMessage::OpponentReady).await;
            ReadyOutcome::Acknowledged
        } else {
            ReadyOutcome::Acknowledged
        }
    }

    /// Apply a valid submission from `channel`. Caller has already
    /// validated the path against the graph and computed alternatives.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_valid_submission(
        &mut self,
        channel: ChannelId,
        winning_path_names: Vec<String>,
        loser_alternatives: Vec<Vec<String>>,
        score: Option<i64>,
        elapsed: Option<Duration>,
    ) {
        if self.status != Status::Active {
            return;
        }
        let winner_user = match self.participant(channel) {
            Some(p) => p.user.clone(),
            None => return,
        };
        self.winner_user_id = Some(winner_user.clone());
        self.status = Status::Finished;

        let is_winner = |p: &Participant| p.channel == channel;
        let participants: Vec<ChannelId> = self.channels();
        for c in participants {
            let participant = self.participant_mut(c).unwrap();
            participant.terminal_sent = true;
            let msg = ServerMessage::GameEnd {
                winner_user_id: Some(winner_user.to_string()),
                reason: GameEndReason::PathFound,
                winning_path: Some(winning_path_names.clone()),
                solution_paths: if is_winner(participant) {
                    None
                } else {
                    Some(loser_alternatives.clone())
                },
                score: if self.mode == Mode::Single { score } else { None },
                time: if self.mode == Mode::Single {
                    elapsed.map(|d| d.as_secs_f64())
                } else {
                    None
                },
            };
            self.participant(c).unwrap().send(msg).await;
        }
    }

    /// Apply an invalid submission from `channel`.
    pub async fn apply_invalid_submission(
        &mut self,
        channel: ChannelId,
        path_length: usize,
    ) -> InvalidOutcome {
        if self.status != Status::Active {
            return InvalidOutcome::NoChange;
        }
        if self.participant(channel).is_none() {
            return InvalidOutcome::NoChange;
        }

        self.strikes_remaining = self.strikes_remaining.saturating_sub(1);
        let strikes_remaining = self.strikes_remaining;

        if let Some(submitter) = self.participant(channel) {
            submitter
                .send(ServerMessage::InvalidPath {
                    path_length,
                    strikes_remaining: Some(strikes_remaining),
                })
                .await;
        }
        if let Some(other) = self.other(channel) {
            other
                .send(ServerMessage::OpponentAttemptedPath {
                    success: false,
                    path_length,
                })
                .await;
        }

        if strikes_remaining > 0 {
            return InvalidOutcome::StillActive { strikes_remaining };
        }

        // Out of strikes: in multiplayer the opponent wins; in single there
        // is no winner.
        self.status = Status::Finished;
        let winner = self.other(channel).map(|p| p.user.clone());
        self.winner_user_id = winner.clone();
        let channels = self.channels();
        for c in channels {
            let participant = self.participant_mut(c).unwrap();
            participant.terminal_sent = true;
            let msg = ServerMessage::GameEnd {
                winner_user_id: winner.as_ref().map(|u| u.to_string()),
                reason: GameEndReason::OutOfStrikes,
                winning_path: None,
                solution_paths: None,
                score: None,
                time: None,
            };
            self.participant(c).unwrap().send(msg).await;
        }
        InvalidOutcome::OutOfStrikes
    }

    /// Apply a `GiveUp` from `channel`.
    pub async fn apply_give_up(&mut self, channel: ChannelId) -> bool {
        if self.status != Status::Active {
            return false;
        }
        if self.participant(channel).is_none() {
            return false;
        }
        self.status = Status::Finished;

        let winner = self.other(channel).map(|p| p.user.clone());
        self.winner_user_id = winner.clone();

        let channels = self.channels();
        for c in channels {
            let participant = self.participant_mut(c).unwrap();
            participant.terminal_sent = true;
            let reason = if c == channel {
                GameEndReason::GaveUp
            } else {
                GameEndReason::OpponentGaveUp
            };
            let msg = ServerMessage::GameEnd {
                winner_user_id: winner.as_ref().map(|u| u.to_string()),
                reason,
                winning_path: None,
                solution_paths: None,
                score: None,
                time: None,
            };
            self.participant(c).unwrap().send(msg).await;
        }
        true
    }

    /// Apply a channel disconnect. Returns `true` if the session reached a
    /// terminal state as a result (always true for multiplayer or single:
    /// with only one or two participants total, a disconnect always leaves
    /// nobody left to keep playing with). In multiplayer, the surviving
    /// participant gets a terminal `opponent_disconnected` frame regardless
    /// of whether the session was `waiting` or `active` — both states have
    /// a still-connected participant who otherwise never hears back.
    pub async fn apply_disconnect(&mut self, channel: ChannelId) -> bool {
        if self.status == Status::Finished {
            return false;
        }
        if self.participant(channel).is_none() {
            return false;
        }

        match self.mode {
            Mode::Single => {
                self.status = Status::Finished;
                true
            }
            Mode::Multiplayer => {
                let winner = self.other(channel).map(|p| p.user.clone());
                self.status = Status::Finished;
                self.winner_user_id = winner.clone();

                if let Some(other) = self.other(channel) {
                    if !other.terminal_sent {
                        other
                            .send(ServerMessage::GameEnd {
                                winner_user_id: winner.as_ref().map(|u| u.to_string()),
                                reason: GameEndReason::OpponentDisconnected,
                                winning_path: None,
                                solution_paths: None,
                                score: None,
                                time: None,
                            })
                            .await;
                    }
                }
                if let Some(other) = self.other_mut(channel) {
                    other.terminal_sent = true;
                }
                true
            }
        }
    }

    fn other_mut(&mut self, channel: ChannelId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.channel != channel)
    }

    /// Apply the wall-clock timeout. No-op if the session is no longer
    /// active (it finished by some other cause first, per §5's
    /// cancellation requirement — this is the idempotent fallback if a race
    /// let the timer fire anyway).
    pub async fn apply_timeout(&mut self, solution_paths: Vec<Vec<String>>) -> bool {
        if self.status != Status::Active {
            return false;
        }
        self.status = Status::Finished;
        let channels = self.channels();
        for c in channels {
            let participant = self.participant_mut(c).unwrap();
            participant.terminal_sent = true;
            let msg = ServerMessage::GameEnd {
                winner_user_id: None,
                reason: GameEndReason::Timeout,
                winning_path: None,
                solution_paths: Some(solution_paths.clone()),
                score: None,
                time: None,
            };
            self.participant(c).unwrap().send(msg).await;
        }
        true
    }

    /// Force-terminate with `internal_error`, used when an unrecoverable
    /// engine fault (e.g. a lost adjacency cache) is detected.
    pub async fn apply_internal_error(&mut self) {
        if self.status == Status::Finished {
            return;
        }
        self.status = Status::Finished;
        let channels = self.channels();
        for c in channels {
            let participant = self.participant_mut(c).unwrap();
            if participant.terminal_sent {
                continue;
            }
            participant.terminal_sent = true;
            let msg = ServerMessage::GameEnd {
                winner_user_id: None,
                reason: GameEndReason::InternalError,
                winning_path: None,
                solution_paths: None,
                score: None,
                time: None,
            };
            self.participant(c).unwrap().send(msg).await;
        }
    }
}
