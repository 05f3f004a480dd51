//! Transport Adapter (C6)
//!
//! Terminates WebSocket connections, runs the handshake, and maps inbound
//! frames onto `Matchmaker`/`SessionManager` operations. Everything below
//! this layer is transport-agnostic; this is the only place that knows
//! about `tokio-tungstenite`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::interval;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use crate::core::{ChannelId, DeterministicRng, UserId};
use crate::graph::{endpoint::EndpointError, Difficulty, GraphStore};
use crate::matchmaking::Matchmaker;
use crate::network::auth::validate_token;
use crate::network::protocol::{AuthResult, AuthenticateRequest, ClientMessage, ServerMessage};
use crate::session::SessionManager;
use crate::stats::StatsWriter;

/// Errors the Transport Adapter surfaces at its own boundary. Everything
/// below (matchmaking, session, graph) handles its own typed errors
/// internally; this enum only covers transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
    /// A WebSocket-level protocol failure outside of normal close.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

struct ChannelEntry {
    user: UserId,
    sender: mpsc::Sender<ServerMessage>,
}

/// Live WebSocket front end: accepts connections, authenticates them, and
/// routes their frames into the Matchmaker and Session Manager.
pub struct GameServer {
    settings: Settings,
    sessions: Arc<SessionManager>,
    matchmaker: Arc<Mutex<Matchmaker>>,
    channels: Arc<RwLock<HashMap<ChannelId, ChannelEntry>>>,
    user_channels: Arc<RwLock<HashMap<UserId, ChannelId>>>,
    next_channel_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Assemble a server around an already-loaded graph snapshot and stats
    /// pool. Does not bind a socket yet; call [`Self::run`] for that.
    pub fn new(settings: Settings, store: Arc<GraphStore>, stats: Arc<StatsWriter>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sessions = Arc::new(SessionManager::new(store, stats, settings.timing.clone()));
        Self {
            settings,
            sessions,
            matchmaker: Arc::new(Mutex::new(Matchmaker::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
            user_channels: Arc::new(RwLock::new(HashMap::new())),
            next_channel_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Bind the listener and serve connections until a shutdown signal
    /// arrives.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.settings.bind_addr).await?;
        info!(addr = %self.settings.bind_addr, "gridiron-relay listening");

        let matchmaking_handle = tokio::spawn(Self::run_matchmaking_loop(
            self.matchmaker.clone(),
            self.sessions.clone(),
            self.user_channels.clone(),
            self.channels.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let connected = self.channels.read().await.len();
                            if connected >= self.settings.max_connections {
                                warn!(%addr, "connection limit reached, rejecting");
                                continue;
                            }
                            debug!(%addr, "accepted connection");
                            self.spawn_connection(stream);
                        }
                        Err(err) => error!(error = %err, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.broadcast_shutdown("server shutting down").await;
        self.sessions.shutdown_all().await;
        matchmaking_handle.abort();
        Ok(())
    }

    /// Signal a graceful shutdown; [`Self::run`] returns once in-flight
    /// work finishes.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn broadcast_shutdown(&self, reason: &str) {
        let channels = self.channels.read().await;
        for entry in channels.values() {
            let _ = entry
                .sender
                .send(ServerMessage::Shutdown { reason: reason.to_string() })
                .await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }

    fn spawn_connection(&self, stream: TcpStream) {
        let sessions = self.sessions.clone();
        let matchmaker = self.matchmaker.clone();
        let channels = self.channels.clone();
        let user_channels = self.user_channels.clone();
        let auth = self.settings.auth.clone();
        let channel_id = ChannelId::new(self.next_channel_id.fetch_add(1, Ordering::Relaxed));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    error!(error = %err, "websocket handshake failed");
                    return;
                }
            };
            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(64);

            let writer = tokio::spawn(async move {
                while let Some(msg) = outbound_rx.recv().await {
                    let Ok(text) = msg.to_json() else { continue };
                    if ws_sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let user = match Self::authenticate(&mut ws_stream, &outbound_tx, &auth).await {
                Some(user) => user,
                None => {
                    writer.abort();
                    return;
                }
            };

            {
                let mut channels = channels.write().await;
                channels.insert(channel_id, ChannelEntry { user: user.clone(), sender: outbound_tx.clone() });
                user_channels.write().await.insert(user.clone(), channel_id);
            }
            debug!(%channel_id, %user, "channel authenticated");

            let mut rng = DeterministicRng::from_entropy();
            loop {
                tokio::select! {
                    frame = ws_stream.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(msg) => {
                                        Self::dispatch(
                                            msg,
                                            channel_id,
                                            &user,
                                            &sessions,
                                            &matchmaker,
                                            &outbound_tx,
                                            &mut rng,
                                        ).await;
                                    }
                                    Err(err) => {
                                        debug!(%channel_id, error = %err, "malformed frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                debug!(%channel_id, error = %err, "websocket read error");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = outbound_tx.send(ServerMessage::Shutdown {
                            reason: "server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            sessions.disconnect(channel_id).await;
            {
                let mut mm = matchmaker.lock().await;
                let _ = mm.dequeue(&user);
            }
            {
                let mut channels = channels.write().await;
                channels.remove(&channel_id);
            }
            {
                let mut users = user_channels.write().await;
                if users.get(&user) == Some(&channel_id) {
                    users.remove(&user);
                }
            }
            writer.abort();
            info!(%channel_id, %user, "channel closed");
        });
    }

    /// Run the handshake: the first frame on a fresh connection must be an
    /// [`AuthenticateRequest`]; anything else is a protocol error and the
    /// connection is torn down without a session ever being created.
    async fn authenticate(
        ws_stream: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
        outbound_tx: &mpsc::Sender<ServerMessage>,
        auth: &crate::network::auth::AuthConfig,
    ) -> Option<UserId> {
        let frame = match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            _ => return None,
        };
        let request: AuthenticateRequest = match serde_json::from_str(&frame) {
            Ok(r) => r,
            Err(_) => {
                let _ = outbound_tx
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: false,
                        user_id: None,
                        error: Some("expected an authenticate frame".to_string()),
                        server_version: crate::VERSION.to_string(),
                    }))
                    .await;
                return None;
            }
        };

        match validate_token(&request.token, auth) {
            Ok(claims) => {
                let user = claims.user_id();
                let _ = outbound_tx
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: true,
                        user_id: Some(user.to_string()),
                        error: None,
                        server_version: crate::VERSION.to_string(),
                    }))
                    .await;
                Some(user)
            }
            Err(err) => {
                let _ = outbound_tx
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: false,
                        user_id: None,
                        error: Some(err.to_string()),
                        server_version: crate::VERSION.to_string(),
                    }))
                    .await;
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        msg: ClientMessage,
        channel_id: ChannelId,
        user: &UserId,
        sessions: &Arc<SessionManager>,
        matchmaker: &Arc<Mutex<Matchmaker>>,
        outbound_tx: &mpsc::Sender<ServerMessage>,
        rng: &mut DeterministicRng,
    ) {
        match msg {
            ClientMessage::JoinQueue { difficulty } => {
                let mut mm = matchmaker.lock().await;
                if let Err(err) = mm.enqueue(user.clone(), difficulty) {
                    debug!(%channel_id, error = %err, "join queue rejected");
                }
            }
            ClientMessage::LeaveQueue => {
                let mut mm = matchmaker.lock().await;
                let _ = mm.dequeue(user);
            }
            ClientMessage::StartSinglePlayerGame { difficulty } => {
                Self::start_single_player(sessions, difficulty, user.clone(), channel_id, outbound_tx.clone(), rng).await;
            }
            ClientMessage::PlayerReady { session_id } => {
                if let Err(err) = sessions.ready(session_id, channel_id).await {
                    debug!(%channel_id, %session_id, error = %err, "playerReady rejected");
                }
            }
            ClientMessage::SubmitPath { session_id, path } => {
                if let Err(err) = sessions.submit_path(session_id, channel_id, path).await {
                    debug!(%channel_id, %session_id, error = %err, "submitPath rejected");
                }
            }
            ClientMessage::GiveUp { session_id } => {
                if let Err(err) = sessions.give_up(session_id, channel_id).await {
                    debug!(%channel_id, %session_id, error = %err, "giveUp rejected");
                }
            }
            ClientMessage::Ping { timestamp } => {
                let server_time = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                let _ = outbound_tx.send(ServerMessage::Pong { timestamp, server_time }).await;
            }
        }
    }

    async fn start_single_player(
        sessions: &Arc<SessionManager>,
        difficulty: Difficulty,
        user: UserId,
        channel_id: ChannelId,
        sender: mpsc::Sender<ServerMessage>,
        rng: &mut DeterministicRng,
    ) {
        match sessions.create_single(difficulty, user, channel_id, sender.clone(), rng).await {
            Ok(_) => {}
            Err(EndpointError::NoneAvailable(difficulty)) => {
                warn!(?difficulty, "no playable endpoints available for single-player request");
                let _ = sender
                    .send(ServerMessage::Error {
                        code: crate::network::protocol::ErrorCode::InternalError,
                        message: "no playable round available right now".to_string(),
                    })
                    .await;
            }
        }
    }

    /// Background loop: pair queued players and spin up multiplayer
    /// sessions. Runs independently of any one connection's task.
    async fn run_matchmaking_loop(
        matchmaker: Arc<Mutex<Matchmaker>>,
        sessions: Arc<SessionManager>,
        user_channels: Arc<RwLock<HashMap<UserId, ChannelId>>>,
        channels: Arc<RwLock<HashMap<ChannelId, ChannelEntry>>>,
    ) {
        let mut ticker = interval(Duration::from_millis(500));
        let mut rng = DeterministicRng::from_entropy();

        loop {
            ticker.tick().await;

            let pair = {
                let mut mm = matchmaker.lock().await;
                mm.try_match()
            };
            let Some(pair) = pair else { continue };

            let first_channel = user_channels.read().await.get(&pair.first).copied();
            let second_channel = user_channels.read().await.get(&pair.second).copied();

            let (Some(first_channel), Some(second_channel)) = (first_channel, second_channel) else {
                // One side disconnected between enqueue and pairing; drop the
                // pairing entirely rather than create a one-sided session.
                debug!("dropping match: a participant disconnected before pairing completed");
                continue;
            };

            let first_sender = channels.read().await.get(&first_channel).map(|e| e.sender.clone());
            let second_sender = channels.read().await.get(&second_channel).map(|e| e.sender.clone());
            let (Some(first_sender), Some(second_sender)) = (first_sender, second_sender) else {
                continue;
            };

            let result = sessions
                .create_multiplayer(
                    pair.difficulty,
                    (pair.first.clone(), first_channel, first_sender),
                    (pair.second.clone(), second_channel, second_sender),
                    &mut rng,
                )
                .await;

            if let Err(EndpointError::NoneAvailable(difficulty)) = result {
                warn!(?difficulty, "no playable endpoints for matched pair, requeueing");
                let mut mm = matchmaker.lock().await;
                mm.requeue_front(pair, std::time::Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_stats() -> Arc<StatsWriter> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/nonexistent")
            .expect("lazy pool construction never fails");
        Arc::new(StatsWriter::new(pool))
    }

    fn empty_store() -> Arc<GraphStore> {
        Arc::new(GraphStore::from_fixture(vec![], vec![], vec![]))
    }

    fn test_settings() -> Settings {
        Settings {
            database_url: "postgres://localhost/nonexistent".to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_connections: 10,
            auth: crate::network::auth::AuthConfig::default(),
            timing: crate::config::SessionTiming::default(),
        }
    }

    #[tokio::test]
    async fn fresh_server_has_no_connections_or_sessions() {
        let server = GameServer::new(test_settings(), empty_store(), lazy_stats());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_signal_is_observable_by_subscribers() {
        let server = GameServer::new(test_settings(), empty_store(), lazy_stats());
        let mut rx = server.shutdown_tx.subscribe();
        server.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
