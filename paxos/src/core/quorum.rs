//! Pure quorum tracking - counts distinct voters per key and detects quorum
//!
//! Used by learners to detect when a value is chosen.

use std::collections::{BTreeMap, BTreeSet};

/// Pure quorum tracker - counts distinct voters per key and detects quorum
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct QuorumCore<K, I, M>
where
    K: Ord,
    I: Ord,
{
    /// Map from key to (voters, message)
    votes: BTreeMap<K, (BTreeSet<I>, M)>,
    /// Quorum threshold
    quorum: usize,
}

impl<K, I, M> QuorumCore<K, I, M>
where
    K: Ord,
    I: Ord,
{
    /// Create a new quorum tracker
    #[must_use]
    pub(crate) fn new(num_voters: usize) -> Self {
        Self {
            votes: BTreeMap::new(),
            quorum: super::types::quorum(num_voters),
        }
    }

    /// Get the quorum threshold
    #[must_use]
    pub(crate) fn quorum(&self) -> usize {
        self.quorum
    }

    /// Number of distinct voters seen for `key`.
    #[must_use]
    pub(crate) fn count(&self, key: &K) -> usize {
        self.votes.get(key).map_or(0, |(voters, _)| voters.len())
    }

    /// Record `voter`'s vote for `key`.
    ///
    /// Returns `Some(&message)` if quorum was JUST reached (exactly), `None`
    /// otherwise. A repeated vote from the same voter is not counted. The
    /// message stored is the one carried by the first vote for `key`.
    pub(crate) fn track(&mut self, key: K, voter: I, message: M) -> Option<&M> {
        let (voters, stored) = self
            .votes
            .entry(key)
            .or_insert_with(|| (BTreeSet::new(), message));
        if voters.insert(voter) && voters.len() == self.quorum {
            Some(stored)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_reached_exactly_once() {
        let mut q: QuorumCore<u64, usize, &str> = QuorumCore::new(5);
        assert_eq!(q.quorum(), 3);
        assert_eq!(q.track(7, 0, "a"), None);
        assert_eq!(q.track(7, 1, "a"), None);
        assert_eq!(q.track(7, 2, "a"), Some(&"a"));
        assert_eq!(q.track(7, 3, "a"), None);
        assert_eq!(q.count(&7), 4);
    }

    #[test]
    fn test_repeated_voter_not_counted() {
        let mut q: QuorumCore<u64, usize, &str> = QuorumCore::new(3);
        assert_eq!(q.track(1, 0, "a"), None);
        assert_eq!(q.track(1, 0, "a"), None);
        assert_eq!(q.count(&1), 1);
        assert_eq!(q.track(1, 2, "a"), Some(&"a"));
    }

    #[test]
    fn test_keys_counted_separately() {
        let mut q: QuorumCore<u64, usize, &str> = QuorumCore::new(3);
        assert_eq!(q.track(1, 0, "a"), None);
        assert_eq!(q.track(2, 1, "b"), None);
        assert_eq!(q.count(&1), 1);
        assert_eq!(q.count(&2), 1);
    }
}
