//! Pure learner state machine - tallies `Accepted` and records the decision

use super::quorum::QuorumCore;
use super::types::{Decision, DecisionSource, ProcessId, ProposalNumber};

/// Pure learner state
///
/// Counts `Accepted` notifications per proposal number from distinct
/// processes. The decision is recorded at most once.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LearnerCore<V> {
    tally: QuorumCore<ProposalNumber, ProcessId, V>,
    decided: Option<Decision<V>>,
}

/// Result of processing an `Accepted`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LearnOutcome<V> {
    /// Counted, no quorum yet
    Pending,
    /// Quorum just reached - broadcast `Decide`
    Decided(Decision<V>),
    /// A decision is already recorded; nothing to do
    AlreadyDecided,
}

impl<V: Clone> LearnerCore<V> {
    #[must_use]
    pub fn new(num_processes: usize) -> Self {
        Self {
            tally: QuorumCore::new(num_processes),
            decided: None,
        }
    }

    #[must_use]
    pub fn decision(&self) -> Option<&Decision<V>> {
        self.decided.as_ref()
    }

    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.decided.is_some()
    }

    /// Distinct `Accepted` senders seen for `n`
    #[must_use]
    pub fn tally(&self, n: ProposalNumber) -> usize {
        self.tally.count(&n)
    }

    #[must_use]
    pub fn quorum(&self) -> usize {
        self.tally.quorum()
    }

    /// Count `from`'s `Accepted(n, value)`.
    pub fn handle_accepted(
        &mut self,
        from: ProcessId,
        n: ProposalNumber,
        value: V,
    ) -> LearnOutcome<V> {
        if self.decided.is_some() {
            return LearnOutcome::AlreadyDecided;
        }
        let Some(value) = self.tally.track(n, from, value) else {
            return LearnOutcome::Pending;
        };
        let decision = Decision {
            proposal: n,
            value: value.clone(),
            source: DecisionSource::Quorum,
        };
        self.decided = Some(decision.clone());
        LearnOutcome::Decided(decision)
    }

    /// Record a decision announced by another learner.
    ///
    /// Returns the new decision, or `None` if one was already recorded.
    pub fn handle_decide(&mut self, n: ProposalNumber, value: V) -> Option<&Decision<V>> {
        if self.decided.is_some() {
            return None;
        }
        self.decided = Some(Decision {
            proposal: n,
            value,
            source: DecisionSource::Announced,
        });
        self.decided.as_ref()
    }
}
