//! Pure acceptor state machine - no I/O, no async, no synchronization
//!
//! This module contains the core state transition logic for a Paxos acceptor.

use super::types::ProposalNumber;

/// Pure acceptor state - no I/O, no async, no synchronization
///
/// Tracks the highest promised proposal number and the highest accepted
/// (proposal, value) pair. The accepted number never exceeds the promised one,
/// and the accepted pair only ever moves to a higher proposal number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AcceptorCore<V> {
    /// Highest proposal number ever promised
    promised: Option<ProposalNumber>,
    /// Highest accepted (proposal, value)
    accepted: Option<(ProposalNumber, V)>,
}

impl<V> Default for AcceptorCore<V> {
    fn default() -> Self {
        Self {
            promised: None,
            accepted: None,
        }
    }
}

/// Result of handling a Prepare request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrepareOutcome<V> {
    /// Promised successfully - carries the currently accepted pair (if any)
    Promised {
        accepted: Option<(ProposalNumber, V)>,
    },
    /// Rejected - an equal or higher number was already promised
    Rejected {
        /// The promise that dominates the request
        promised: ProposalNumber,
    },
}

/// Result of handling an Accept request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Accepted; the caller announces the pair to every learner
    Accepted,
    /// Rejected - a higher number was already promised
    Rejected {
        /// The promise that dominates the request
        promised: ProposalNumber,
    },
}

impl<V: Clone> AcceptorCore<V> {
    /// Create a new empty acceptor state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest proposal number promised so far
    #[must_use]
    pub fn promised(&self) -> Option<ProposalNumber> {
        self.promised
    }

    /// Highest accepted (proposal, value)
    #[must_use]
    pub fn accepted(&self) -> Option<&(ProposalNumber, V)> {
        self.accepted.as_ref()
    }

    /// Handle a Prepare request - pure state transition
    ///
    /// Promises `n` only if it is strictly greater than every number promised
    /// before. On success the promise watermark moves to `n` and the reply
    /// carries the current accepted pair. On failure nothing changes.
    pub fn prepare(&mut self, n: ProposalNumber) -> PrepareOutcome<V> {
        match self.promised {
            Some(promised) if n <= promised => PrepareOutcome::Rejected { promised },
            _ => {
                self.promised = Some(n);
                PrepareOutcome::Promised {
                    accepted: self.accepted.clone(),
                }
            }
        }
    }

    /// Handle an Accept request - pure state transition
    ///
    /// Accepts `(n, value)` if `n` is at least the promise watermark; the
    /// proposal just promised is therefore acceptable. On success both the
    /// accepted pair and the watermark move to `n`.
    pub fn accept(&mut self, n: ProposalNumber, value: V) -> AcceptOutcome {
        match self.promised {
            Some(promised) if n < promised => AcceptOutcome::Rejected { promised },
            _ => {
                self.promised = Some(n);
                self.accepted = Some((n, value));
                AcceptOutcome::Accepted
            }
        }
    }
}
