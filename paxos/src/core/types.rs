//! Core type definitions for the Paxos protocol
//!
//! These types are shared between the async runtime and the model checker.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a process, in `0..num_processes`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessId(pub usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<usize> for ProcessId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

/// Totally ordered proposal number, unique per (proposer, round).
///
/// Numbers are generated as `round * num_processes + proposer`, so two
/// proposers never produce the same number and a single proposer's numbers
/// strictly increase with its round.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProposalNumber(u64);

impl ProposalNumber {
    /// Number for `proposer`'s attempt in `round` among `num_processes` processes.
    #[must_use]
    pub const fn new(round: u64, proposer: ProcessId, num_processes: usize) -> Self {
        Self(round * num_processes as u64 + proposer.0 as u64)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The round this number was generated in.
    #[must_use]
    pub const fn round(self, num_processes: usize) -> u64 {
        self.0 / num_processes as u64
    }

    /// The proposer that generated this number.
    #[must_use]
    pub const fn proposer(self, num_processes: usize) -> ProcessId {
        ProcessId((self.0 % num_processes as u64) as usize)
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Quorum size for `num_processes` processes: a strict majority.
#[must_use]
pub const fn quorum(num_processes: usize) -> usize {
    num_processes / 2 + 1
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Wire messages exchanged between processes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Message<V> {
    /// Phase 1a: proposer asks every acceptor to promise `n`
    Prepare { n: ProposalNumber },
    /// Phase 1b: acceptor promised `n`, reporting its highest accepted pair
    Promise {
        n: ProposalNumber,
        accepted: Option<(ProposalNumber, V)>,
    },
    /// Phase 1b: acceptor has already promised a higher number than `n`
    PrepareFailed { n: ProposalNumber },
    /// Phase 2a: proposer asks every acceptor to accept `(n, value)`
    Accept { n: ProposalNumber, value: V },
    /// Phase 2b: acceptor accepted `(n, value)`, sent to every learner
    Accepted { n: ProposalNumber, value: V },
    /// A learner observed a quorum for `(n, value)`
    Decide { n: ProposalNumber, value: V },
}

impl<V> Message<V> {
    /// Proposal number carried by the message.
    #[must_use]
    pub fn proposal_number(&self) -> ProposalNumber {
        match self {
            Self::Prepare { n }
            | Self::Promise { n, .. }
            | Self::PrepareFailed { n }
            | Self::Accept { n, .. }
            | Self::Accepted { n, .. }
            | Self::Decide { n, .. } => *n,
        }
    }

    /// Short message kind, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Promise { .. } => "promise",
            Self::PrepareFailed { .. } => "prepare-failed",
            Self::Accept { .. } => "accept",
            Self::Accepted { .. } => "accepted",
            Self::Decide { .. } => "decide",
        }
    }
}

/// Destination of an outgoing message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Target {
    /// A single process
    Process(ProcessId),
    /// Every process, including the sender
    All,
}

/// A message produced by a state transition, waiting to be sent.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Outgoing<V> {
    pub target: Target,
    pub message: Message<V>,
}

impl<V> Outgoing<V> {
    #[must_use]
    pub fn to(process: ProcessId, message: Message<V>) -> Self {
        Self {
            target: Target::Process(process),
            message,
        }
    }

    #[must_use]
    pub fn broadcast(message: Message<V>) -> Self {
        Self {
            target: Target::All,
            message,
        }
    }
}

// =============================================================================
// DECISIONS
// =============================================================================

/// How a learner came to know the decided value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DecisionSource {
    /// Observed `Accepted` from a quorum of distinct processes
    Quorum,
    /// Told by another learner's `Decide`
    Announced,
}

/// The chosen value, as recorded by one learner.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Decision<V> {
    pub proposal: ProposalNumber,
    pub value: V,
    pub source: DecisionSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_unique_across_proposers() {
        let n = 5;
        let mut seen = std::collections::BTreeSet::new();
        for round in 1..10 {
            for id in 0..n {
                assert!(seen.insert(ProposalNumber::new(round, ProcessId(id), n)));
            }
        }
    }

    #[test]
    fn test_numbers_strictly_increase_per_proposer() {
        let id = ProcessId(2);
        let numbers: Vec<_> = (1..6).map(|r| ProposalNumber::new(r, id, 3)).collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_number_decomposes() {
        let n = ProposalNumber::new(4, ProcessId(3), 5);
        assert_eq!(n.get(), 23);
        assert_eq!(n.round(5), 4);
        assert_eq!(n.proposer(5), ProcessId(3));
    }

    #[test]
    fn test_quorum_is_strict_majority() {
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }
}
