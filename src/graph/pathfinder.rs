//! Pathfinder (C2)
//!
//! Breadth-first search over the Graph Store's adjacency cache, bounded to a
//! fixed hop depth. BFS guarantees the first path found to any node is a
//! shortest one, which is the only property the Session Engine needs — it
//! never needs every path, just one, and needs to know when none exists
//! within the bound.

use std::collections::{HashSet, VecDeque};

use super::store::GraphStore;
use super::types::ConnectionType;
use crate::core::PlayerId;

/// Maximum number of edges a discovered path may contain.
pub const MAX_HOPS: usize = 5;

/// One step of a discovered path: the player reached, and the connection
/// type of the edge used to reach it from the previous player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub player: PlayerId,
    pub via: ConnectionType,
}

/// A complete path from a search's start to its target, inclusive of both
/// endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    /// The starting player (not repeated in `steps`).
    pub start: PlayerId,
    /// Every hop after `start`, in order; `steps.last()` is the target.
    pub steps: Vec<PathStep>,
}

impl Path {
    /// Number of edges in the path.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every player visited, start to target, in order.
    pub fn players(&self) -> Vec<PlayerId> {
        let mut out = Vec::with_capacity(self.steps.len() + 1);
        out.push(self.start.clone());
        out.extend(self.steps.iter().map(|s| s.player.clone()));
        out
    }
}

/// Find a shortest path between `from` and `to` using only edges whose type
/// is in `allowed`, no longer than `MAX_HOPS` edges. If `from` and `to` are
/// the same player, returns the single-node path (zero edges). Returns
/// `None` if no path exists within the hop bound.
pub fn shortest_path(
    store: &GraphStore,
    from: &PlayerId,
    to: &PlayerId,
    allowed: &HashSet<ConnectionType>,
) -> Option<Path> {
    if from == to {
        return Some(Path {
            start: from.clone(),
            steps: Vec::new(),
        });
    }

    let mut visited = HashSet::new();
    visited.insert(from.clone());

    // Each queue entry carries the path taken to reach it so far.
    let mut queue: VecDeque<Vec<PathStep>> = VecDeque::new();
    queue.push_back(Vec::new());
    let mut frontier_player = vec![from.clone()];

    // BFS level by level so we can enforce the hop bound cheaply.
    for _depth in 0..MAX_HOPS {
        let mut next_frontier = Vec::new();
        let mut next_queue = VecDeque::new();

        for (player, path_so_far) in frontier_player.iter().zip(queue.iter()) {
            for (neighbor, via) in store.get_neighbors(player, allowed) {
                if neighbor == *to {
                    let mut steps = path_so_far.clone();
                    steps.push(PathStep { player: neighbor, via });
                    return Some(Path {
                        start: from.clone(),
                        steps,
                    });
                }
                if visited.insert(neighbor.clone()) {
                    let mut steps = path_so_far.clone();
                    steps.push(PathStep {
                        player: neighbor.clone(),
                        via,
                    });
                    next_frontier.push(neighbor);
                    next_queue.push_back(steps);
                }
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        frontier_player = next_frontier;
        queue = next_queue;
    }

    None
}

/// Find up to `k` distinct shortest paths between `from` and `to`, all of
/// the same minimum length, deduplicated by node sequence. Explores the
/// whole minimum-length frontier rather than stopping at the first hit, so
/// it costs more than [`shortest_path`] and should only be called where
/// alternatives are actually needed (session end, not session setup).
pub fn shortest_paths(
    store: &GraphStore,
    from: &PlayerId,
    to: &PlayerId,
    allowed: &HashSet<ConnectionType>,
    k: usize,
) -> Vec<Path> {
    if k == 0 {
        return Vec::new();
    }
    if from == to {
        return vec![Path {
            start: from.clone(),
            steps: Vec::new(),
        }];
    }

    // Level 0: just the start, with an empty path so far.
    let mut frontier: Vec<(PlayerId, Vec<PathStep>)> = vec![(from.clone(), Vec::new())];
    let mut visited_at_shallower_depth: HashSet<PlayerId> = HashSet::new();
    visited_at_shallower_depth.insert(from.clone());

    for _depth in 0..MAX_HOPS {
        let mut found: Vec<Vec<PathStep>> = Vec::new();
        let mut next_frontier: Vec<(PlayerId, Vec<PathStep>)> = Vec::new();
        let mut next_level_visited: HashSet<PlayerId> = HashSet::new();

        for (player, path_so_far) in &frontier {
            for (neighbor, via) in store.get_neighbors(player, allowed) {
                if visited_at_shallower_depth.contains(&neighbor) {
                    continue;
                }
                let mut steps = path_so_far.clone();
                steps.push(PathStep {
                    player: neighbor.clone(),
                    via,
                });
                if neighbor == *to {
                    found.push(steps);
                } else {
                    next_level_visited.insert(neighbor.clone());
                    next_frontier.push((neighbor, steps));
                }
            }
        }

        if !found.is_empty() {
            let mut seen_sequences = HashSet::new();
            let mut paths = Vec::new();
            for steps in found {
                let sequence: Vec<PlayerId> = steps.iter().map(|s| s.player.clone()).collect();
                if seen_sequences.insert(sequence) {
                    paths.push(Path {
                        start: from.clone(),
                        steps,
                    });
                    if paths.len() == k {
                        break;
                    }
                }
            }
            return paths;
        }

        if next_frontier.is_empty() {
            break;
        }
        visited_at_shallower_depth.extend(next_level_visited);
        frontier = next_frontier;
    }

    Vec::new()
}

/// Whether a candidate path (player ids in order, start to target) is a
/// valid solution: every consecutive pair is connected by an edge whose type
/// is in `allowed`, no player repeats, and the path has no fewer than
/// `min_edges` edges.
pub fn validate_path(
    store: &GraphStore,
    candidate: &[PlayerId],
    allowed: &HashSet<ConnectionType>,
    min_edges: usize,
) -> bool {
    if candidate.len() < 2 {
        return false;
    }
    if candidate.len() - 1 < min_edges {
        return false;
    }

    let mut seen = HashSet::new();
    for player in candidate {
        if !seen.insert(player.clone()) {
            return false; // repeated player: not a simple path
        }
    }

    candidate
        .windows(2)
        .all(|pair| store.has_allowed_edge(&pair[0], &pair[1], allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{Connection, Player, Position};

    fn player(id: &str) -> Player {
        Player {
            id: PlayerId::new(id),
            name: id.to_string(),
            position: Position::Wr,
        }
    }

    fn chain_store() -> GraphStore {
        // a - b - c - d - e - f  (teammate edges only)
        let ids = ["a", "b", "c", "d", "e", "f"];
        let players = ids.iter().map(|id| player(id)).collect();
        let mut connections = Vec::new();
        for pair in ids.windows(2) {
            connections.push(Connection {
                player1: PlayerId::new(pair[0]),
                player2: PlayerId::new(pair[1]),
                connection_type: ConnectionType::Teammate,
            });
        }
        GraphStore::from_fixture(players, connections, vec![])
    }

    fn teammate_only() -> HashSet<ConnectionType> {
        [ConnectionType::Teammate].into_iter().collect()
    }

    #[test]
    fn finds_direct_edge() {
        let store = chain_store();
        let allowed = teammate_only();
        let path = shortest_path(&store, &PlayerId::new("a"), &PlayerId::new("b"), &allowed).unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn finds_shortest_multi_hop_path() {
        let store = chain_store();
        let allowed = teammate_only();
        let path = shortest_path(&store, &PlayerId::new("a"), &PlayerId::new("d"), &allowed).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(
            path.players(),
            vec![
                PlayerId::new("a"),
                PlayerId::new("b"),
                PlayerId::new("c"),
                PlayerId::new("d"),
            ]
        );
    }

    #[test]
    fn respects_hop_bound() {
        let store = chain_store();
        let allowed = teammate_only();
        // a to f is 5 hops, exactly at the bound, so it should still be found.
        let path = shortest_path(&store, &PlayerId::new("a"), &PlayerId::new("f"), &allowed).unwrap();
        assert_eq!(path.len(), MAX_HOPS);
    }

    #[test]
    fn same_player_returns_single_node_path() {
        let store = chain_store();
        let allowed = teammate_only();
        let path = shortest_path(&store, &PlayerId::new("a"), &PlayerId::new("a"), &allowed).unwrap();
        assert_eq!(path.len(), 0);
        assert_eq!(path.players(), vec![PlayerId::new("a")]);

        let paths = shortest_paths(&store, &PlayerId::new("a"), &PlayerId::new("a"), &allowed, 3);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].players(), vec![PlayerId::new("a")]);
    }

    #[test]
    fn unreachable_player_has_no_path() {
        let store = GraphStore::from_fixture(
            vec![player("a"), player("b"), player("isolated")],
            vec![Connection {
                player1: PlayerId::new("a"),
                player2: PlayerId::new("b"),
                connection_type: ConnectionType::Teammate,
            }],
            vec![],
        );
        let allowed = teammate_only();
        assert!(shortest_path(&store, &PlayerId::new("a"), &PlayerId::new("isolated"), &allowed).is_none());
    }

    #[test]
    fn validate_path_rejects_disconnected_hop() {
        let store = chain_store();
        let allowed = teammate_only();
        let candidate = vec![PlayerId::new("a"), PlayerId::new("c")];
        assert!(!validate_path(&store, &candidate, &allowed, 1));
    }

    #[test]
    fn validate_path_rejects_repeated_player() {
        let store = chain_store();
        let allowed = teammate_only();
        let candidate = vec![
            PlayerId::new("a"),
            PlayerId::new("b"),
            PlayerId::new("a"),
        ];
        assert!(!validate_path(&store, &candidate, &allowed, 1));
    }

    #[test]
    fn validate_path_enforces_min_edges() {
        let store = chain_store();
        let allowed = teammate_only();
        let candidate = vec![PlayerId::new("a"), PlayerId::new("b")];
        assert!(!validate_path(&store, &candidate, &allowed, 2));
        assert!(validate_path(&store, &candidate, &allowed, 1));
    }

    #[test]
    fn validate_path_accepts_valid_chain() {
        let store = chain_store();
        let allowed = teammate_only();
        let candidate = vec![PlayerId::new("a"), PlayerId::new("b"), PlayerId::new("c")];
        assert!(validate_path(&store, &candidate, &allowed, 2));
    }
}
