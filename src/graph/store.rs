//! Graph Store (C1)
//!
//! Read-only accessor for players and labeled connections. Backed by
//! Postgres, but the interface hides SQL entirely: the full `players` and
//! `player_connections` tables are loaded into an in-memory adjacency cache
//! once at startup (the store is fully populated before the server accepts
//! clients), and every subsequent read is served from memory. This mirrors
//! `krukah-robopoker`'s `PostgresLookup` connection pattern, generalized from
//! single-row lookups to a wholly-cached snapshot per the graph's "effectively
//! static within a process run" invariant.

use std::collections::{HashMap, HashSet};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::types::{Connection, ConnectionType, Difficulty, Player, Position};
use crate::core::PlayerId;

/// Errors surfaced by the Graph Store.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Could not connect to, or query, the backing database.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A fully-loaded snapshot of the player-connections graph.
pub struct GraphStore {
    players: HashMap<PlayerId, Player>,
    adjacency: HashMap<PlayerId, Vec<(PlayerId, ConnectionType)>>,
    /// Best recorded PPR fantasy points per player, across all seasons.
    best_ppr: HashMap<PlayerId, f64>,
}

impl GraphStore {
    /// Connect to the database and load the full graph snapshot.
    pub async fn connect(database_url: &str) -> Result<Self, GraphError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Self::load(&pool).await
    }

    /// Load the graph snapshot from an already-open pool. Split out from
    /// `connect` so tests can load against a pool pointed at fixture data.
    pub async fn load(pool: &PgPool) -> Result<Self, GraphError> {
        let player_rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT id, name, position FROM players"#,
        )
        .fetch_all(pool)
        .await?;

        let mut players = HashMap::with_capacity(player_rows.len());
        for (id, name, position) in player_rows {
            let id = PlayerId::new(id);
            players.insert(
                id.clone(),
                Player {
                    id,
                    name,
                    position: parse_position(&position),
                },
            );
        }

        let connection_rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT player1_id, player2_id, connection_type FROM player_connections"#,
        )
        .fetch_all(pool)
        .await?;

        let mut adjacency: HashMap<PlayerId, Vec<(PlayerId, ConnectionType)>> = HashMap::new();
        for (p1, p2, ty) in connection_rows {
            let connection = Connection {
                player1: PlayerId::new(p1),
                player2: PlayerId::new(p2),
                connection_type: parse_connection_type(&ty),
            };
            if connection.player1 == connection.player2 {
                continue; // no self-loops
            }
            adjacency
                .entry(connection.player1.clone())
                .or_default()
                .push((connection.player2.clone(), connection.connection_type));
            adjacency
                .entry(connection.player2.clone())
                .or_default()
                .push((connection.player1.clone(), connection.connection_type));
        }
        for neighbors in adjacency.values_mut() {
            dedup_neighbors(neighbors);
        }

        let ppr_rows: Vec<(String, f64)> = sqlx::query_as(
            r#"SELECT player_id, MAX(fantasy_points_ppr) FROM player_seasonal_stats GROUP BY player_id"#,
        )
        .fetch_all(pool)
        .await?;

        let mut best_ppr = HashMap::with_capacity(ppr_rows.len());
        for (player_id, ppr) in ppr_rows {
            best_ppr.insert(PlayerId::new(player_id), ppr);
        }

        info!(
            players = players.len(),
            connections = adjacency.values().map(Vec::len).sum::<usize>() / 2,
            "graph store loaded"
        );

        Ok(Self {
            players,
            adjacency,
            best_ppr,
        })
    }

    /// Build a store directly from in-memory fixtures, for tests.
    #[cfg(test)]
    pub fn from_fixture(
        players: Vec<Player>,
        connections: Vec<Connection>,
        ppr: Vec<(PlayerId, f64)>,
    ) -> Self {
        let mut player_map = HashMap::new();
        for p in players {
            player_map.insert(p.id.clone(), p);
        }

        let mut adjacency: HashMap<PlayerId, Vec<(PlayerId, ConnectionType)>> = HashMap::new();
        for c in connections {
            if c.player1 == c.player2 {
                continue;
            }
            adjacency
                .entry(c.player1.clone())
                .or_default()
                .push((c.player2.clone(), c.connection_type));
            adjacency
                .entry(c.player2.clone())
                .or_default()
                .push((c.player1.clone(), c.connection_type));
        }
        for neighbors in adjacency.values_mut() {
            dedup_neighbors(neighbors);
        }

        Self {
            players: player_map,
            adjacency,
            best_ppr: ppr.into_iter().collect(),
        }
    }

    /// Look up a player by id.
    pub fn get_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Every directly connected neighbor of `id` whose edge type is in
    /// `allowed`, each (neighbor, type) pair yielded once.
    pub fn get_neighbors(
        &self,
        id: &PlayerId,
        allowed: &HashSet<ConnectionType>,
    ) -> Vec<(PlayerId, ConnectionType)> {
        self.adjacency
            .get(id)
            .map(|neighbors| {
                neighbors
                    .iter()
                    .filter(|(_, ty)| allowed.contains(ty))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether an edge of one of the allowed types exists between `a` and `b`.
    pub fn has_allowed_edge(
        &self,
        a: &PlayerId,
        b: &PlayerId,
        allowed: &HashSet<ConnectionType>,
    ) -> bool {
        self.adjacency
            .get(a)
            .map(|neighbors| neighbors.iter().any(|(n, ty)| n == b && allowed.contains(ty)))
            .unwrap_or(false)
    }

    /// The endpoint candidate pool for a difficulty's primary tier.
    pub fn pool_for_difficulty(&self, difficulty: Difficulty) -> Vec<PlayerId> {
        let floor = difficulty.pool_ppr_floor();
        let ceiling = difficulty.pool_ppr_ceiling();
        match floor {
            None => self.players_with_any_recorded_stats(),
            Some(floor) => self
                .best_ppr
                .iter()
                .filter(|(_, ppr)| **ppr >= floor && ceiling.map_or(true, |c| **ppr < c))
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }

    /// One tier wider than any difficulty's primary pool: any player with at
    /// least one recorded stat line.
    pub fn players_with_any_recorded_stats(&self) -> Vec<PlayerId> {
        self.best_ppr.keys().cloned().collect()
    }

    /// Every player in the graph, regardless of recorded stats.
    pub fn all_player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().cloned().collect()
    }

    /// Map a player id to its display name, for outbound frames. Falls back
    /// to the raw id if the player has since disappeared from the snapshot.
    pub fn display_name(&self, id: &PlayerId) -> String {
        self.players
            .get(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

fn dedup_neighbors(neighbors: &mut Vec<(PlayerId, ConnectionType)>) {
    let mut seen = HashSet::new();
    neighbors.retain(|entry| seen.insert(entry.clone()));
}

fn parse_position(raw: &str) -> Position {
    match raw.to_ascii_uppercase().as_str() {
        "QB" => Position::Qb,
        "RB" => Position::Rb,
        "WR" => Position::Wr,
        "TE" => Position::Te,
        _ => Position::Other,
    }
}

fn parse_connection_type(raw: &str) -> ConnectionType {
    match raw {
        "teammate" => ConnectionType::Teammate,
        "college" => ConnectionType::College,
        "draft_class" => ConnectionType::DraftClass,
        "position" => ConnectionType::Position,
        other => panic!("unknown connection_type in database: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, name: &str) -> Player {
        Player {
            id: PlayerId::new(id),
            name: name.to_string(),
            position: Position::Wr,
        }
    }

    fn fixture() -> GraphStore {
        GraphStore::from_fixture(
            vec![player("p1", "Alice"), player("p2", "Bob"), player("p3", "Cara")],
            vec![
                Connection {
                    player1: PlayerId::new("p1"),
                    player2: PlayerId::new("p2"),
                    connection_type: ConnectionType::Teammate,
                },
                Connection {
                    player1: PlayerId::new("p1"),
                    player2: PlayerId::new("p2"),
                    connection_type: ConnectionType::College,
                },
            ],
            vec![(PlayerId::new("p1"), 200.0), (PlayerId::new("p2"), 100.0)],
        )
    }

    #[test]
    fn neighbors_are_filtered_by_allowed_type() {
        let store = fixture();
        let allowed: HashSet<_> = [ConnectionType::Teammate].into_iter().collect();
        let neighbors = store.get_neighbors(&PlayerId::new("p1"), &allowed);
        assert_eq!(neighbors, vec![(PlayerId::new("p2"), ConnectionType::Teammate)]);
    }

    #[test]
    fn multiple_edge_types_between_same_pair_both_surface() {
        let store = fixture();
        let allowed: HashSet<_> = ConnectionType::ALL.into_iter().collect();
        let neighbors = store.get_neighbors(&PlayerId::new("p1"), &allowed);
        assert_eq!(neighbors.len(), 2);
    }

    #[test]
    fn neighbors_are_undirected() {
        let store = fixture();
        let allowed: HashSet<_> = [ConnectionType::Teammate].into_iter().collect();
        let neighbors = store.get_neighbors(&PlayerId::new("p2"), &allowed);
        assert_eq!(neighbors, vec![(PlayerId::new("p1"), ConnectionType::Teammate)]);
    }

    #[test]
    fn unknown_player_has_no_neighbors() {
        let store = fixture();
        let allowed: HashSet<_> = ConnectionType::ALL.into_iter().collect();
        assert!(store.get_neighbors(&PlayerId::new("ghost"), &allowed).is_empty());
    }

    #[test]
    fn pool_for_difficulty_respects_ppr_band() {
        let store = fixture();
        let easy_pool = store.pool_for_difficulty(Difficulty::Easy);
        assert_eq!(easy_pool, vec![PlayerId::new("p1")]);
    }

    #[test]
    fn display_name_falls_back_to_id_for_unknown_player() {
        let store = fixture();
        assert_eq!(store.display_name(&PlayerId::new("ghost")), "ghost");
    }
}
