//! Graph domain types: players, connection types, and difficulty parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::PlayerId;

/// A roster position, used only for tiering and display — never for traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    /// Quarterback.
    Qb,
    /// Running back.
    Rb,
    /// Wide receiver.
    Wr,
    /// Tight end.
    Te,
    /// Any position not otherwise enumerated.
    Other,
}

/// A node in the player-connections graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Graph identity.
    pub id: PlayerId,
    /// Display name shown to clients.
    pub name: String,
    /// Roster position.
    pub position: Position,
}

/// The closed set of labels an edge between two players may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Played on the same team in the same season.
    Teammate,
    /// Attended the same college.
    College,
    /// Drafted in the same year.
    DraftClass,
    /// Plays the same position.
    Position,
}

impl ConnectionType {
    /// All four connection types, for the `easy` difficulty's filter.
    pub const ALL: [ConnectionType; 4] = [
        ConnectionType::Teammate,
        ConnectionType::College,
        ConnectionType::DraftClass,
        ConnectionType::Position,
    ];
}

/// A single labeled edge between two players, as read from `player_connections`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// One endpoint of the unordered pair.
    pub player1: PlayerId,
    /// The other endpoint of the unordered pair.
    pub player2: PlayerId,
    /// The label on this edge.
    pub connection_type: ConnectionType,
}

/// Game difficulty — determines the allowed traversal filter, strike budget,
/// minimum solution length, and endpoint candidate pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Any connection type, generous strikes, top fantasy tier endpoints.
    Easy,
    /// Teammate/college only, mid-tier endpoints.
    Medium,
    /// Teammate only, any recorded player as an endpoint.
    Hard,
}

impl Difficulty {
    /// Edge types a path may traverse at this difficulty.
    pub fn allowed_types(self) -> HashSet<ConnectionType> {
        match self {
            Difficulty::Easy => ConnectionType::ALL.into_iter().collect(),
            Difficulty::Medium => [ConnectionType::Teammate, ConnectionType::College]
                .into_iter()
                .collect(),
            Difficulty::Hard => [ConnectionType::Teammate].into_iter().collect(),
        }
    }

    /// Strikes a session at this difficulty starts with.
    pub fn strike_budget(self) -> u32 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 5,
            Difficulty::Hard => 3,
        }
    }

    /// Minimum number of edges a valid solution must contain.
    pub fn min_edges(self) -> usize {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 2,
        }
    }

    /// Minimum PPR fantasy points a player must have to belong to this
    /// difficulty's endpoint candidate pool (`None` for "any recorded row").
    pub fn pool_ppr_floor(self) -> Option<f64> {
        match self {
            Difficulty::Easy => Some(150.0),
            Difficulty::Medium => Some(75.0),
            Difficulty::Hard => None,
        }
    }

    /// Exclusive upper PPR bound for the pool, if any (`medium` is a band).
    pub fn pool_ppr_ceiling(self) -> Option<f64> {
        match self {
            Difficulty::Medium => Some(150.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easy_allows_every_connection_type() {
        assert_eq!(Difficulty::Easy.allowed_types().len(), 4);
    }

    #[test]
    fn hard_allows_only_teammate() {
        let allowed = Difficulty::Hard.allowed_types();
        assert_eq!(allowed.len(), 1);
        assert!(allowed.contains(&ConnectionType::Teammate));
    }

    #[test]
    fn strike_budgets_match_spec() {
        assert_eq!(Difficulty::Easy.strike_budget(), 10);
        assert_eq!(Difficulty::Medium.strike_budget(), 5);
        assert_eq!(Difficulty::Hard.strike_budget(), 3);
    }

    #[test]
    fn min_edges_match_spec() {
        assert_eq!(Difficulty::Easy.min_edges(), 1);
        assert_eq!(Difficulty::Medium.min_edges(), 2);
        assert_eq!(Difficulty::Hard.min_edges(), 2);
    }
}
