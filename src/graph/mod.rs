//! The player-connections graph: storage, traversal, and endpoint selection.

pub mod endpoint;
pub mod pathfinder;
pub mod store;
pub mod types;

pub use endpoint::{pick_endpoints, EndpointError};
pub use pathfinder::{shortest_path, validate_path, Path, PathStep, MAX_HOPS};
pub use store::{GraphError, GraphStore};
pub use types::{Connection, ConnectionType, Difficulty, Player, Position};
