//! Matchmaker (C4)
//!
//! A single ordered queue of waiting players. Pairing policy is oldest-two:
//! whenever two or more entries are queued, the two that have waited longest
//! are paired, and the session inherits the first (longer-waiting) entry's
//! difficulty. This keeps wait time bounded and avoids the starvation a
//! difficulty-partitioned queue would risk once traffic is thin.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::info;

use crate::core::UserId;
use crate::graph::Difficulty;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatchmakerError {
    /// The user already has an entry in the queue.
    #[error("user is already queued")]
    AlreadyQueued,
    /// The user has no entry in the queue to remove.
    #[error("user is not queued")]
    NotQueued,
}

/// One waiting player.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub user: UserId,
    pub difficulty: Difficulty,
    queued_at: Instant,
}

/// A paired match, ready to become a session.
#[derive(Clone, Debug)]
pub struct Match {
    pub first: UserId,
    pub second: UserId,
    pub difficulty: Difficulty,
}

/// The ordered matchmaking queue.
#[derive(Default)]
pub struct Matchmaker {
    queue: VecDeque<QueueEntry>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    /// Add `user` to the back of the queue at `difficulty`.
    pub fn enqueue(&mut self, user: UserId, difficulty: Difficulty) -> Result<(), MatchmakerError> {
        if self.queue.iter().any(|e| e.user == user) {
            return Err(MatchmakerError::AlreadyQueued);
        }
        self.queue.push_back(QueueEntry {
            user,
            difficulty,
            queued_at: Instant::now(),
        });
        Ok(())
    }

    /// Remove `user` from the queue, if present.
    pub fn dequeue(&mut self, user: &UserId) -> Result<(), MatchmakerError> {
        let position = self.queue.iter().position(|e| &e.user == user);
        match position {
            Some(idx) => {
                self.queue.remove(idx);
                Ok(())
            }
            None => Err(MatchmakerError::NotQueued),
        }
    }

    /// If at least two players are queued, pop the oldest two and pair them.
    /// The pair's difficulty is the longer-waiting entry's difficulty.
    pub fn try_match(&mut self) -> Option<Match> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        info!(
            first = %first.user,
            second = %second.user,
            difficulty = ?first.difficulty,
            waited_ms = first.queued_at.elapsed().as_millis(),
            "paired queued players"
        );
        Some(Match {
            first: first.user,
            second: second.user,
            difficulty: first.difficulty,
        })
    }

    /// Undo a [`try_match`] pairing that couldn't be completed (no playable
    /// endpoint pair was available for the match's difficulty): put both
    /// entries back at the head of the queue, oldest first, so they are the
    /// next pair considered rather than losing their place to newer joiners.
    pub fn requeue_front(&mut self, pair: Match, queued_at: Instant) {
        self.queue.push_front(QueueEntry {
            user: pair.second,
            difficulty: pair.difficulty,
            queued_at,
        });
        self.queue.push_front(QueueEntry {
            user: pair.first,
            difficulty: pair.difficulty,
            queued_at,
        });
    }

    /// Number of players currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether `user` currently has a queue entry.
    pub fn is_queued(&self, user: &UserId) -> bool {
        self.queue.iter().any(|e| &e.user == user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name)
    }

    #[test]
    fn enqueue_rejects_duplicate() {
        let mut mm = Matchmaker::new();
        mm.enqueue(user("a"), Difficulty::Easy).unwrap();
        assert_eq!(mm.enqueue(user("a"), Difficulty::Hard), Err(MatchmakerError::AlreadyQueued));
    }

    #[test]
    fn dequeue_unknown_user_errors() {
        let mut mm = Matchmaker::new();
        assert_eq!(mm.dequeue(&user("ghost")), Err(MatchmakerError::NotQueued));
    }

    #[test]
    fn try_match_needs_two_entries() {
        let mut mm = Matchmaker::new();
        mm.enqueue(user("a"), Difficulty::Easy).unwrap();
        assert!(mm.try_match().is_none());
    }

    #[test]
    fn try_match_pairs_oldest_two_in_fifo_order() {
        let mut mm = Matchmaker::new();
        mm.enqueue(user("a"), Difficulty::Medium).unwrap();
        mm.enqueue(user("b"), Difficulty::Hard).unwrap();
        mm.enqueue(user("c"), Difficulty::Easy).unwrap();

        let pair = mm.try_match().unwrap();
        assert_eq!(pair.first, user("a"));
        assert_eq!(pair.second, user("b"));
        assert_eq!(pair.difficulty, Difficulty::Medium);
        assert_eq!(mm.len(), 1);
        assert!(mm.is_queued(&user("c")));
    }

    #[test]
    fn requeue_front_restores_head_of_queue_position() {
        let mut mm = Matchmaker::new();
        mm.enqueue(user("a"), Difficulty::Easy).unwrap();
        mm.enqueue(user("b"), Difficulty::Easy).unwrap();
        let pair = mm.try_match().unwrap();
        assert_eq!(mm.len(), 0);

        mm.enqueue(user("c"), Difficulty::Easy).unwrap();
        mm.requeue_front(pair, Instant::now());

        // a and b are back ahead of c, who joined while they were "in flight".
        let pair = mm.try_match().unwrap();
        assert_eq!(pair.first, user("a"));
        assert_eq!(pair.second, user("b"));
        assert!(mm.is_queued(&user("c")));
    }

    #[test]
    fn dequeue_removes_from_future_pairing() {
        let mut mm = Matchmaker::new();
        mm.enqueue(user("a"), Difficulty::Easy).unwrap();
        mm.enqueue(user("b"), Difficulty::Easy).unwrap();
        mm.dequeue(&user("a")).unwrap();
        mm.enqueue(user("c"), Difficulty::Easy).unwrap();

        let pair = mm.try_match().unwrap();
        assert_eq!(pair.first, user("b"));
        assert_eq!(pair.second, user("c"));
    }
}
