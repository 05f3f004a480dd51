//! Endpoint Picker (C3)
//!
//! Chooses the two players a session asks its participants to connect.
//! Candidates are drawn from the difficulty's tiered pool, widening to
//! wider tiers and finally the full player set if a tier is too small to
//! sample from, then rejected and retried if the sampled pair turns out to
//! have no path within the hop bound (the one check a pool membership test
//! can't make cheaply).

use tracing::warn;

use super::pathfinder::{shortest_path, MAX_HOPS};
use super::store::GraphStore;
use super::types::Difficulty;
use crate::core::{DeterministicRng, PlayerId};

/// A tier is considered too small to sample evenly from below this count.
const MIN_POOL_SIZE: usize = 10;

/// Number of sample-and-check retries before giving up.
const MAX_ATTEMPTS: usize = 50;

/// Errors from endpoint selection.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// No pair of distinct endpoints with a path between them could be found
    /// within the retry budget.
    #[error("no connected endpoint pair available for difficulty {0:?}")]
    NoneAvailable(Difficulty),
}

/// Pick two distinct players at the given difficulty with a guaranteed path
/// between them (so the round is solvable by construction).
pub fn pick_endpoints(
    store: &GraphStore,
    difficulty: Difficulty,
    rng: &mut DeterministicRng,
) -> Result<(PlayerId, PlayerId), EndpointError> {
    let pool = materialize_pool(store, difficulty);
    if pool.len() < 2 {
        return Err(EndpointError::NoneAvailable(difficulty));
    }

    let allowed = difficulty.allowed_types();
    let min_edges = difficulty.min_edges();
    for _ in 0..MAX_ATTEMPTS {
        let (i, j) = match rng.pick_two_distinct(pool.len()) {
            Some(pair) => pair,
            None => return Err(EndpointError::NoneAvailable(difficulty)),
        };
        let (a, b) = (&pool[i], &pool[j]);
        if let Some(path) = shortest_path(store, a, b, &allowed) {
            if path.len() >= min_edges {
                return Ok((a.clone(), b.clone()));
            }
        }
    }

    warn!(?difficulty, attempts = MAX_ATTEMPTS, "endpoint sampling exhausted");
    Err(EndpointError::NoneAvailable(difficulty))
}

/// Resolve the difficulty's primary pool, widening to a bigger candidate set
/// if it's too small to sample evenly, and finally to every player.
fn materialize_pool(store: &GraphStore, difficulty: Difficulty) -> Vec<PlayerId> {
    let primary = store.pool_for_difficulty(difficulty);
    if primary.len() >= MIN_POOL_SIZE {
        return primary;
    }

    let wider = store.players_with_any_recorded_stats();
    if wider.len() >= MIN_POOL_SIZE {
        return wider;
    }

    store.all_player_ids()
}
