//! Pure proposer state machine - no I/O, no async
//!
//! This module contains the core state transition logic for a Paxos proposer.

use std::collections::BTreeSet;

use super::types::{Message, ProcessId, ProposalNumber, quorum};

/// Proposer phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProposerPhase {
    /// No attempt in flight (not started yet, or abandoned after a rejection)
    Idle,
    /// Collecting promises (Phase 1)
    AwaitingPromises,
    /// Accept sent, waiting for the value to be chosen (Phase 2)
    AwaitingAccepts,
    /// A value was decided; the proposer never acts again
    Done,
}

/// Result of processing a Promise
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromiseOutcome<V> {
    /// Not for the current attempt, or not collecting promises
    Stale,
    /// Need more promises
    Pending,
    /// Got quorum - broadcast this Accept
    Quorum(Message<V>),
}

/// Result of processing a `PrepareFailed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionOutcome {
    /// Not for the current attempt, or not collecting promises
    Stale,
    /// The current attempt was abandoned; the proposer is idle
    Abandoned,
}

/// Pure proposer state - drives one attempt at a time through both phases
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProposerCore<V> {
    id: ProcessId,
    num_processes: usize,
    quorum: usize,
    /// Round of the latest attempt; zero before the first attempt
    round: u64,
    /// Number of the latest attempt
    current: Option<ProposalNumber>,
    /// Value to send in phase 2 (own value, or adopted from a promise)
    candidate: V,
    /// Acceptors that promised the current attempt
    promises: BTreeSet<ProcessId>,
    /// Highest accepted proposal reported by a promise this attempt
    max_accepted_seen: Option<ProposalNumber>,
    phase: ProposerPhase,
    attempts: u32,
}

impl<V: Clone> ProposerCore<V> {
    /// Create an idle proposer for process `id` proposing `value`
    #[must_use]
    pub fn new(id: ProcessId, num_processes: usize, value: V) -> Self {
        Self {
            id,
            num_processes,
            quorum: quorum(num_processes),
            round: 0,
            current: None,
            candidate: value,
            promises: BTreeSet::new(),
            max_accepted_seen: None,
            phase: ProposerPhase::Idle,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ProposerPhase {
        self.phase
    }

    /// Number of the latest attempt
    #[must_use]
    pub fn current_number(&self) -> Option<ProposalNumber> {
        self.current
    }

    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Value the proposer would send in phase 2 right now
    #[must_use]
    pub fn candidate(&self) -> &V {
        &self.candidate
    }

    /// Distinct promises collected for the current attempt
    #[must_use]
    pub fn promises_received(&self) -> usize {
        self.promises.len()
    }

    #[must_use]
    pub fn max_accepted_seen(&self) -> Option<ProposalNumber> {
        self.max_accepted_seen
    }

    /// Attempts started so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a new attempt and return the Prepare to broadcast.
    ///
    /// The new number is strictly greater than every number this proposer
    /// used before and, if `floor` is given, strictly greater than `floor`.
    pub fn start_attempt(&mut self, floor: Option<ProposalNumber>) -> Message<V> {
        let mut round = self.round + 1;
        if let Some(floor) = floor {
            round = round.max(floor.round(self.num_processes) + 1);
        }
        self.round = round;
        let n = ProposalNumber::new(round, self.id, self.num_processes);
        self.current = Some(n);
        self.promises.clear();
        self.max_accepted_seen = None;
        self.phase = ProposerPhase::AwaitingPromises;
        self.attempts += 1;
        Message::Prepare { n }
    }

    /// Process a Promise from `acceptor`.
    ///
    /// Adopts the value of the highest accepted proposal reported so far, so a
    /// proposer never overrides a value that may already have been chosen.
    pub fn handle_promise(
        &mut self,
        acceptor: ProcessId,
        n: ProposalNumber,
        accepted: Option<(ProposalNumber, V)>,
    ) -> PromiseOutcome<V> {
        if self.phase != ProposerPhase::AwaitingPromises || self.current != Some(n) {
            return PromiseOutcome::Stale;
        }
        if !self.promises.insert(acceptor) {
            return PromiseOutcome::Pending;
        }

        if let Some((accepted_n, value)) = accepted
            && self.max_accepted_seen.is_none_or(|max| accepted_n > max)
        {
            self.max_accepted_seen = Some(accepted_n);
            self.candidate = value;
        }

        if self.promises.len() >= self.quorum {
            self.phase = ProposerPhase::AwaitingAccepts;
            PromiseOutcome::Quorum(Message::Accept {
                n,
                value: self.candidate.clone(),
            })
        } else {
            PromiseOutcome::Pending
        }
    }

    /// Process a `PrepareFailed`: the current attempt is abandoned.
    ///
    /// Only an attempt still collecting promises can be abandoned; once the
    /// Accept went out, a late rejection from a minority changes nothing.
    pub fn handle_prepare_failed(&mut self, n: ProposalNumber) -> RejectionOutcome {
        if self.phase != ProposerPhase::AwaitingPromises || self.current != Some(n) {
            return RejectionOutcome::Stale;
        }
        self.phase = ProposerPhase::Idle;
        RejectionOutcome::Abandoned
    }

    /// Give up the in-flight attempt, if any. Returns whether one was dropped.
    pub fn abandon(&mut self) -> bool {
        match self.phase {
            ProposerPhase::AwaitingPromises | ProposerPhase::AwaitingAccepts => {
                self.phase = ProposerPhase::Idle;
                true
            }
            ProposerPhase::Idle | ProposerPhase::Done => false,
        }
    }

    /// A value was decided; stop proposing for good.
    pub fn finish(&mut self) {
        self.phase = ProposerPhase::Done;
    }
}
