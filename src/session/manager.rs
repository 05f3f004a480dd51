//! Session Manager — the session registry and its orchestration.
//!
//! Owns every live [`Session`] behind its own `tokio::sync::Mutex`, plus the
//! channel -> session reverse index the transport adapter needs to route
//! inbound frames. Per §5's suspension-point discipline, calls that need the
//! Pathfinder snapshot the fields they need, drop the session lock, compute
//! off-lock, then re-enter and discard the result if the session moved on in
//! the meantime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::info;

use crate::config::SessionTiming;
use crate::core::{ChannelId, DeterministicRng, PlayerId, SessionId, UserId};
use crate::graph::endpoint::{pick_endpoints, EndpointError};
use crate::graph::pathfinder::{shortest_paths, validate_path, Path};
use crate::graph::{Difficulty, GraphStore};
use crate::network::protocol::{PlayerSummary, ServerMessage};
use crate::session::engine::{InvalidOutcome, Mode, Participant, ReadyOutcome, Session, Status};
use crate::stats::{record_best_effort, SessionOutcome, StatsWriter};

/// Errors the manager surfaces to the transport adapter. Anything else
/// (wrong-state inputs, duplicate events) is handled as a silent no-op per
/// §7's `Rejected` category rather than an error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// `session_id` doesn't name a session currently tracked by the registry.
    #[error("unknown session")]
    UnknownSession,
    /// `channel` named a real session, but isn't one of its participants.
    #[error("channel is not a participant of this session")]
    NotAParticipant,
}

/// Map a set of discovered paths to display-name sequences, deduplicating
/// after the mapping (distinct node-id sequences can map to the same names,
/// e.g. two players who share a display name).
fn dedup_named_paths(store: &GraphStore, paths: impl IntoIterator<Item = Path>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .map(|p| p.players().iter().map(|id| store.display_name(id)).collect::<Vec<String>>())
        .filter(|names| seen.insert(names.clone()))
        .collect()
}

struct FinishedSnapshot {
    mode: Mode,
    channels: Vec<ChannelId>,
    participants: Vec<UserId>,
    winner: Option<UserId>,
    score: Option<i64>,
}

/// Registry of live sessions plus the machinery to create, drive, and retire
/// them.
pub struct SessionManager {
    store: Arc<GraphStore>,
    stats: Arc<StatsWriter>,
    timing: SessionTiming,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    channel_sessions: RwLock<HashMap<ChannelId, SessionId>>,
    timeouts: RwLock<HashMap<SessionId, AbortHandle>>,
}

impl SessionManager {
    pub fn new(store: Arc<GraphStore>, stats: Arc<StatsWriter>, timing: SessionTiming) -> Self {
        Self {
            store,
            stats,
            timing,
            sessions: RwLock::new(HashMap::new()),
            channel_sessions: RwLock::new(HashMap::new()),
            timeouts: RwLock::new(HashMap::new()),
        }
    }

    /// Session a given channel currently belongs to, if any.
    pub async fn session_for_channel(&self, channel: ChannelId) -> Option<SessionId> {
        self.channel_sessions.read().await.get(&channel).copied()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Create a multiplayer session for two freshly paired channels. Picks
    /// endpoints via the Endpoint Picker (C3); propagates `NoneAvailable`
    /// so the caller can requeue the pair instead of creating an
    /// unplayable session.
    pub async fn create_multiplayer(
        self: &Arc<Self>,
        difficulty: Difficulty,
        first: (UserId, ChannelId, mpsc::Sender<ServerMessage>),
        second: (UserId, ChannelId, mpsc::Sender<ServerMessage>),
        rng: &mut DeterministicRng,
    ) -> Result<SessionId, EndpointError> {
        let (start, end) = pick_endpoints(&self.store, difficulty, rng)?;
        let id = SessionId::new();

        let (user_a, channel_a, sender_a) = first;
        let (user_b, channel_b, sender_b) = second;
        let participant_a = Participant::new(user_a, channel_a, sender_a);
        let participant_b = Participant::new(user_b, channel_b, sender_b);

        let session = Session::new_multiplayer(id, difficulty, start.clone(), end.clone(), participant_a, participant_b);
        let session = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(id, session.clone());
        {
            let mut channels = self.channel_sessions.write().await;
            channels.insert(channel_a, id);
            channels.insert(channel_b, id);
        }

        self.send_game_start(&session, &start, &end).await;
        info!(session_id = %id, ?difficulty, "multiplayer session created");
        Ok(id)
    }

    /// Create a single-player session, active immediately.
    pub async fn create_single(
        self: &Arc<Self>,
        difficulty: Difficulty,
        user: UserId,
        channel: ChannelId,
        sender: mpsc::Sender<ServerMessage>,
        rng: &mut DeterministicRng,
    ) -> Result<SessionId, EndpointError> {
        let (start, end) = pick_endpoints(&self.store, difficulty, rng)?;
        let id = SessionId::new();
        let participant = Participant::new(user, channel, sender);
        let session = Session::new_single(id, difficulty, start.clone(), end.clone(), participant);
        let session = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(id, session.clone());
        self.channel_sessions.write().await.insert(channel, id);

        self.send_game_start(&session, &start, &end).await;
        info!(session_id = %id, ?difficulty, "single-player session created");
        Ok(id)
    }

    async fn send_game_start(&self, session: &Arc<Mutex<Session>>, start: &PlayerId, end: &PlayerId) {
        let start_summary = PlayerSummary {
            id: start.clone(),
            name: self.store.display_name(start),
        };
        let end_summary = PlayerSummary {
            id: end.clone(),
            name: self.store.display_name(end),
        };
        session.lock().await.emit_game_start(start_summary, end_summary).await;
    }

    async fn get(&self, session_id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Apply a `playerReady` input.
    pub async fn ready(self: &Arc<Self>, session_id: SessionId, channel: ChannelId) -> Result<(), SessionError> {
        let session = self.get(session_id).await.ok_or(SessionError::UnknownSession)?;
        let outcome = {
            let mut guard = session.lock().await;
            if !guard.has_channel(channel) {
                return Err(SessionError::NotAParticipant);
            }
            guard.ready(channel).await
        };
        if outcome == ReadyOutcome::AllReady {
            self.arm_timeout(session_id, session).await;
        }
        Ok(())
    }

    async fn arm_timeout(self: &Arc<Self>, session_id: SessionId, session: Arc<Mutex<Session>>) {
        let manager = self.clone();
        let deadline = self.timing.deadline();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            manager.fire_timeout(session_id, session).await;
        });
        self.timeouts.write().await.insert(session_id, handle.abort_handle());
    }

    async fn fire_timeout(self: Arc<Self>, session_id: SessionId, session: Arc<Mutex<Session>>) {
        let (allowed, start, end) = {
            let guard = session.lock().await;
            if guard.status() != Status::Active {
                return;
            }
            (guard.allowed_types().clone(), guard.start_player.clone(), guard.end_player.clone())
        };

        let solution_paths = dedup_named_paths(
            &self.store,
            shortest_paths(&self.store, &start, &end, &allowed, self.timing.solution_fanout),
        );

        let finished = {
            let mut guard = session.lock().await;
            guard.apply_timeout(solution_paths).await
        };
        if finished {
            let snapshot = self.snapshot_finished(&session).await;
            self.finalize(session_id, snapshot).await;
        }
    }

    /// Apply a `submitPath` input.
    pub async fn submit_path(
        self: &Arc<Self>,
        session_id: SessionId,
        channel: ChannelId,
        path: Vec<PlayerId>,
    ) -> Result<(), SessionError> {
        let session = self.get(session_id).await.ok_or(SessionError::UnknownSession)?;

        let (mode, allowed, min_edges, start, end, start_epoch) = {
            let guard = session.lock().await;
            if !guard.has_channel(channel) {
                return Err(SessionError::NotAParticipant);
            }
            if guard.status() != Status::Active {
                return Ok(()); // Rejected: silently ignored per §7.
            }
            (
                guard.mode,
                guard.allowed_types().clone(),
                guard.min_edges(),
                guard.start_player.clone(),
                guard.end_player.clone(),
                guard.start_epoch,
            )
        };

        let is_valid = path.first() == Some(&start)
            && path.last() == Some(&end)
            && validate_path(&self.store, &path, &allowed, min_edges);

        let (finished, score_for_stats) = if is_valid {
            let winning_names: Vec<String> = path.iter().map(|id| self.store.display_name(id)).collect();

            let loser_alternatives: Vec<Vec<String>> = if mode == Mode::Multiplayer {
                let candidates = shortest_paths(&self.store, &start, &end, &allowed, self.timing.solution_fanout + 1)
                    .into_iter()
                    .filter(|p| p.players() != path);
                let mut alternatives = dedup_named_paths(&self.store, candidates);
                alternatives.truncate(self.timing.solution_fanout);
                alternatives
            } else {
                Vec::new()
            };

            let (score, elapsed) = if mode == Mode::Single {
                let elapsed = start_epoch.elapsed();
                let edges = path.len().saturating_sub(1) as i64;
                let penalty = (elapsed.as_secs_f64() * 10.0).floor() as i64 + edges * 100;
                (Some((10_000 - penalty).max(0)), Some(elapsed))
            } else {
                (None, None)
            };

            let mut guard = session.lock().await;
            if guard.status() != Status::Active {
                return Ok(()); // Raced with another terminal cause; discard.
            }
            guard
                .apply_valid_submission(channel, winning_names, loser_alternatives, score, elapsed)
                .await;
            (true, score)
        } else {
            let path_length = path.len();
            let mut guard = session.lock().await;
            if guard.status() != Status::Active {
                return Ok(());
            }
            let outcome = guard.apply_invalid_submission(channel, path_length).await;
            (matches!(outcome, InvalidOutcome::OutOfStrikes), None)
        };

        if finished {
            let mut snapshot = self.snapshot_finished(&session).await;
            snapshot.score = score_for_stats;
            self.finalize(session_id, snapshot).await;
        }
        Ok(())
    }

    /// Apply a `giveUp` input.
    pub async fn give_up(self: &Arc<Self>, session_id: SessionId, channel: ChannelId) -> Result<(), SessionError> {
        let session = self.get(session_id).await.ok_or(SessionError::UnknownSession)?;
        let finished = {
            let mut guard = session.lock().await;
            if !guard.has_channel(channel) {
                return Err(SessionError::NotAParticipant);
            }
            guard.apply_give_up(channel).await
        };
        if finished {
            let snapshot = self.snapshot_finished(&session).await;
            self.finalize(session_id, snapshot).await;
        }
        Ok(())
    }

    /// Apply a channel disconnect. No-op if the channel isn't in any session.
    pub async fn disconnect(self: &Arc<Self>, channel: ChannelId) {
        let Some(session_id) = self.session_for_channel(channel).await else {
            return;
        };
        let Some(session) = self.get(session_id).await else {
            return;
        };
        let finished = session.lock().await.apply_disconnect(channel).await;
        if finished {
            let snapshot = self.snapshot_finished(&session).await;
            self.finalize(session_id, snapshot).await;
        }
    }

    /// Force every still-live session to a terminal `internal_error` frame
    /// and tear the registry down. Used on graceful shutdown and on
    /// detection of an unrecoverable engine fault.
    pub async fn shutdown_all(self: &Arc<Self>) {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        for id in ids {
            if let Some(session) = self.get(id).await {
                session.lock().await.apply_internal_error().await;
                let snapshot = self.snapshot_finished(&session).await;
                self.finalize(id, snapshot).await;
            }
        }
    }

    async fn snapshot_finished(&self, session: &Arc<Mutex<Session>>) -> FinishedSnapshot {
        let guard = session.lock().await;
        FinishedSnapshot {
            mode: guard.mode,
            channels: guard.channels(),
            participants: guard.participants().iter().map(|p| p.user.clone()).collect(),
            winner: guard.winner_user_id.clone(),
            score: None,
        }
    }

    async fn finalize(self: &Arc<Self>, session_id: SessionId, snapshot: FinishedSnapshot) {
        self.sessions.write().await.remove(&session_id);
        {
            let mut channels = self.channel_sessions.write().await;
            for channel in &snapshot.channels {
                channels.remove(channel);
            }
        }
        if let Some(handle) = self.timeouts.write().await.remove(&session_id) {
            handle.abort();
        }

        record_best_effort(
            &self.stats,
            SessionOutcome {
                session_id,
                mode: snapshot.mode,
                participants: snapshot.participants,
                winner_user_id: snapshot.winner,
                score: snapshot.score,
            },
        )
        .await;

        info!(session_id = %session_id, "session finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{Connection, ConnectionType, Player, Position};
    use crate::network::protocol::GameEndReason;
    use sqlx::postgres::PgPoolOptions;

    fn player(id: &str) -> Player {
        Player {
            id: PlayerId::new(id),
            name: id.to_string(),
            position: Position::Wr,
        }
    }

    fn clique_store() -> Arc<GraphStore> {
        let ids: Vec<String> = (0..12).map(|i| format!("p{i}")).collect();
        let players = ids.iter().map(|id| player(id)).collect();
        let mut connections = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                connections.push(Connection {
                    player1: PlayerId::new(ids[i].clone()),
                    player2: PlayerId::new(ids[j].clone()),
                    connection_type: ConnectionType::Teammate,
                });
            }
        }
        let ppr = ids.iter().map(|id| (PlayerId::new(id.clone()), 200.0)).collect();
        Arc::new(GraphStore::from_fixture(players, connections, ppr))
    }

    /// A `StatsWriter` whose pool is never actually connected: fine because
    /// these tests exercise single-player give-up/disconnect paths that
    /// never reach a database call, and Postgres's lazy connection
    /// semantics mean `PgPoolOptions::connect_lazy` doesn't dial until a
    /// query runs.
    fn lazy_stats() -> Arc<StatsWriter> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/nonexistent")
            .expect("lazy pool construction never fails");
        Arc::new(StatsWriter::new(pool))
    }

    #[tokio::test]
    async fn give_up_in_single_player_has_no_winner_and_removes_session() {
        let store = clique_store();
        let stats = lazy_stats();
        let manager = Arc::new(SessionManager::new(store, stats, SessionTiming::default()));

        let (tx, mut rx) = mpsc::channel(16);
        let mut rng = DeterministicRng::new(1);
        let session_id = manager
            .create_single(Difficulty::Easy, UserId::new("solo"), ChannelId::new(1), tx, &mut rng)
            .await
            .unwrap();
        let _ = rx.recv().await; // gameStart

        manager.give_up(session_id, ChannelId::new(1)).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::GameEnd { winner_user_id: None, reason: GameEndReason::GaveUp, .. })
        ));
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.session_for_channel(ChannelId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn unknown_session_id_is_an_error() {
        let store = clique_store();
        let stats = lazy_stats();
        let manager = Arc::new(SessionManager::new(store, stats, SessionTiming::default()));
        let result = manager.ready(SessionId::new(), ChannelId::new(1)).await;
        assert_eq!(result, Err(SessionError::UnknownSession));
    }

    #[tokio::test]
    async fn disconnect_of_unmapped_channel_is_a_no_op() {
        let store = clique_store();
        let stats = lazy_stats();
        let manager = Arc::new(SessionManager::new(store, stats, SessionTiming::default()));
        manager.disconnect(ChannelId::new(999)).await;
    }

    #[test]
    fn dedup_named_paths_collapses_distinct_ids_sharing_a_display_name() {
        use crate::graph::pathfinder::PathStep;

        let store = GraphStore::from_fixture(
            vec![
                Player { id: PlayerId::new("a"), name: "Start".to_string(), position: Position::Wr },
                Player { id: PlayerId::new("b1"), name: "Same Name".to_string(), position: Position::Wr },
                Player { id: PlayerId::new("b2"), name: "Same Name".to_string(), position: Position::Wr },
                Player { id: PlayerId::new("c"), name: "End".to_string(), position: Position::Wr },
            ],
            vec![],
            vec![],
        );

        let via_b1 = Path {
            start: PlayerId::new("a"),
            steps: vec![
                PathStep { player: PlayerId::new("b1"), via: ConnectionType::Teammate },
                PathStep { player: PlayerId::new("c"), via: ConnectionType::Teammate },
            ],
        };
        let via_b2 = Path {
            start: PlayerId::new("a"),
            steps: vec![
                PathStep { player: PlayerId::new("b2"), via: ConnectionType::Teammate },
                PathStep { player: PlayerId::new("c"), via: ConnectionType::Teammate },
            ],
        };

        let named = dedup_named_paths(&store, vec![via_b1, via_b2]);
        assert_eq!(named, vec![vec!["Start".to_string(), "Same Name".to_string(), "End".to_string()]]);
    }
}
