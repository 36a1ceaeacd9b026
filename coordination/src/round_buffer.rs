//! Per-round response buffer with a release barrier.
//!
//! Each round slot moves `Empty → Accumulating → Released`. The insert that
//! brings a slot to the expected cardinality receives the whole batch and
//! the slot is cleared in the same step, so a round releases exactly once
//! and no response leaks into a later round.
//!
//! [`RoundBuffer`] is meant to live inside a single-threaded agent. Callers
//! that insert from several tasks wrap it in a mutex; the lock then covers
//! the check-and-release, so only one concurrent inserter sees the threshold.

use std::collections::BTreeMap;

use crate::protocol::AgentId;

/// What an insert did to its round slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferInsert<T> {
    /// Stored; `received` of `expected` peers reported so far.
    Accumulating { received: usize, expected: usize },
    /// This peer already reported for the round; nothing stored.
    Duplicate,
    /// The barrier fired. The batch is in arrival order and the slot is empty.
    Released(Vec<T>),
}

impl<T> BufferInsert<T> {
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released(_))
    }
}

/// Observable state of one round slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Accumulating(usize),
}

/// Collects peer responses per round until `expected` distinct peers
/// reported.
#[derive(Debug, Clone)]
pub struct RoundBuffer<T> {
    expected: usize,
    slots: BTreeMap<u32, Vec<(AgentId, T)>>,
    releases: u64,
}

impl<T> RoundBuffer<T> {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            slots: BTreeMap::new(),
            releases: 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Add `peer`'s response for `round`.
    pub fn insert(&mut self, round: u32, peer: AgentId, item: T) -> BufferInsert<T> {
        let slot = self.slots.entry(round).or_default();
        if slot.iter().any(|(p, _)| p == &peer) {
            return BufferInsert::Duplicate;
        }
        slot.push((peer, item));

        if slot.len() < self.expected {
            return BufferInsert::Accumulating {
                received: slot.len(),
                expected: self.expected,
            };
        }

        let batch = self
            .slots
            .remove(&round)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, item)| item)
            .collect();
        self.releases += 1;
        BufferInsert::Released(batch)
    }

    pub fn state(&self, round: u32) -> SlotState {
        match self.slots.get(&round) {
            Some(slot) if !slot.is_empty() => SlotState::Accumulating(slot.len()),
            _ => SlotState::Empty,
        }
    }

    /// Rounds currently accumulating.
    pub fn open_rounds(&self) -> Vec<u32> {
        self.slots.keys().copied().collect()
    }

    /// Total releases since construction.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Drop every partially filled round.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn peer(i: usize) -> AgentId {
        AgentId::new(format!("peer_{}", i))
    }

    #[test]
    fn test_releases_exactly_at_expected() {
        let mut buffer = RoundBuffer::new(2);
        assert_eq!(
            buffer.insert(1, peer(0), "a"),
            BufferInsert::Accumulating {
                received: 1,
                expected: 2
            }
        );
        assert_eq!(buffer.state(1), SlotState::Accumulating(1));
        assert_eq!(
            buffer.insert(1, peer(1), "b"),
            BufferInsert::Released(vec!["a", "b"])
        );
        assert_eq!(buffer.state(1), SlotState::Empty);
        assert_eq!(buffer.releases(), 1);
    }

    #[test]
    fn test_duplicate_peer_does_not_release_twice() {
        let mut buffer = RoundBuffer::new(2);
        buffer.insert(3, peer(0), 1);
        assert_eq!(buffer.insert(3, peer(0), 2), BufferInsert::Duplicate);
        assert!(buffer.insert(3, peer(1), 3).is_released());
        assert_eq!(buffer.releases(), 1);
        assert!(buffer.open_rounds().is_empty());
    }

    #[test]
    fn test_released_round_refills_independently() {
        let mut buffer = RoundBuffer::new(2);
        buffer.insert(1, peer(0), "r1-a");
        assert_eq!(
            buffer.insert(1, peer(1), "r1-b"),
            BufferInsert::Released(vec!["r1-a", "r1-b"])
        );

        // A later refill of the same round starts from empty.
        assert!(!buffer.insert(1, peer(0), "again").is_released());
        assert_eq!(buffer.state(1), SlotState::Accumulating(1));
    }

    #[test]
    fn test_rounds_are_isolated() {
        let mut buffer = RoundBuffer::new(2);
        buffer.insert(1, peer(0), "r1");
        buffer.insert(2, peer(0), "r2");
        assert_eq!(buffer.open_rounds(), vec![1, 2]);
        assert_eq!(
            buffer.insert(2, peer(1), "r2b"),
            BufferInsert::Released(vec!["r2", "r2b"])
        );
        assert_eq!(buffer.state(1), SlotState::Accumulating(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_elect_one_releaser() {
        for _ in 0..50 {
            let buffer = Arc::new(Mutex::new(RoundBuffer::new(8)));
            let mut handles = Vec::new();
            for i in 0..8 {
                let buffer = Arc::clone(&buffer);
                handles.push(tokio::spawn(async move {
                    buffer.lock().unwrap().insert(0, peer(i), i).is_released()
                }));
            }

            let mut released = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    released += 1;
                }
            }
            assert_eq!(released, 1);
            let buffer = buffer.lock().unwrap();
            assert_eq!(buffer.releases(), 1);
            assert_eq!(buffer.state(0), SlotState::Empty);
        }
    }
}
