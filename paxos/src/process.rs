//! Per-process coordinator owning the acceptor, proposer and learner roles.
//!
//! A [`Process`] is a single-writer state machine: message dispatch is the
//! only mutator, and every transition returns the messages to send. It never
//! performs I/O, so the same code runs under the tokio runtime and under the
//! model checker.

use std::fmt;

use tracing::{debug, trace};

use crate::config::ClusterConfig;
use crate::core::{
    AcceptOutcome, AcceptorCore, Decision, LearnOutcome, LearnerCore, Message, Outgoing,
    PrepareOutcome, ProcessId, PromiseOutcome, ProposalNumber, ProposerCore, ProposerPhase,
    RejectionOutcome,
};

/// One Paxos process: an acceptor and a learner, plus a proposer if configured.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Process<V> {
    id: ProcessId,
    num_processes: usize,
    acceptor: AcceptorCore<V>,
    proposer: Option<ProposerCore<V>>,
    learner: LearnerCore<V>,
}

impl<V> Process<V>
where
    V: Clone + fmt::Debug,
{
    /// Create process `id` of `num_processes`; `proposal` makes it a proposer.
    #[must_use]
    pub fn new(id: ProcessId, num_processes: usize, proposal: Option<V>) -> Self {
        Self {
            id,
            num_processes,
            acceptor: AcceptorCore::new(),
            proposer: proposal.map(|value| ProposerCore::new(id, num_processes, value)),
            learner: LearnerCore::new(num_processes),
        }
    }

    /// Create process `id` as described by `config`.
    #[must_use]
    pub fn from_config(config: &ClusterConfig<V>, id: ProcessId) -> Self {
        Self::new(id, config.num_processes(), config.proposal_for(id).cloned())
    }

    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    #[must_use]
    pub fn num_processes(&self) -> usize {
        self.num_processes
    }

    #[must_use]
    pub fn acceptor(&self) -> &AcceptorCore<V> {
        &self.acceptor
    }

    #[must_use]
    pub fn proposer(&self) -> Option<&ProposerCore<V>> {
        self.proposer.as_ref()
    }

    #[must_use]
    pub fn learner(&self) -> &LearnerCore<V> {
        &self.learner
    }

    #[must_use]
    pub fn decision(&self) -> Option<&Decision<V>> {
        self.learner.decision()
    }

    /// A decided process has no further obligations and stops servicing messages.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.learner.is_decided()
    }

    #[must_use]
    pub fn proposer_phase(&self) -> Option<ProposerPhase> {
        self.proposer.as_ref().map(ProposerCore::phase)
    }

    /// Kick off the first attempt if this process is a proposer.
    pub fn start(&mut self) -> Vec<Outgoing<V>> {
        match self.proposer_phase() {
            Some(ProposerPhase::Idle) if !self.is_terminated() => self.begin_attempt(),
            _ => Vec::new(),
        }
    }

    /// Start a fresh attempt after the previous one was abandoned.
    ///
    /// The new number also exceeds anything the co-located acceptor has
    /// promised, so the attempt is not rejected by this process outright.
    pub fn retry(&mut self) -> Vec<Outgoing<V>> {
        self.start()
    }

    /// Abandon the in-flight attempt, e.g. when a phase timed out.
    pub fn abandon_attempt(&mut self) -> bool {
        let abandoned = self.proposer.as_mut().is_some_and(ProposerCore::abandon);
        if abandoned {
            debug!(id = %self.id, "proposer: abandoned attempt");
        }
        abandoned
    }

    fn begin_attempt(&mut self) -> Vec<Outgoing<V>> {
        let Some(proposer) = self.proposer.as_mut() else {
            return Vec::new();
        };
        // The first attempt is always round 1; only retries skip ahead
        let floor = if proposer.attempts() > 0 {
            self.acceptor.promised()
        } else {
            None
        };
        let prepare = proposer.start_attempt(floor);
        debug!(
            id = %self.id,
            n = %prepare.proposal_number(),
            attempt = proposer.attempts(),
            "proposer: sending prepare"
        );
        vec![Outgoing::broadcast(prepare)]
    }

    /// Dispatch one message from `from` to the role that handles it.
    pub fn handle(&mut self, from: ProcessId, message: Message<V>) -> Vec<Outgoing<V>> {
        if self.is_terminated() {
            trace!(id = %self.id, %from, kind = message.kind(), "terminated, dropping message");
            return Vec::new();
        }

        match message {
            Message::Prepare { n } => match self.acceptor.prepare(n) {
                PrepareOutcome::Promised { accepted } => {
                    debug!(id = %self.id, %n, previous = ?accepted.as_ref().map(|(na, _)| *na), "acceptor: promised");
                    vec![Outgoing::to(from, Message::Promise { n, accepted })]
                }
                PrepareOutcome::Rejected { promised } => {
                    debug!(id = %self.id, %n, %promised, "acceptor: rejected prepare");
                    vec![Outgoing::to(from, Message::PrepareFailed { n })]
                }
            },
            Message::Accept { n, value } => match self.acceptor.accept(n, value.clone()) {
                AcceptOutcome::Accepted => {
                    debug!(id = %self.id, %n, ?value, "acceptor: accepted");
                    vec![Outgoing::broadcast(Message::Accepted { n, value })]
                }
                AcceptOutcome::Rejected { promised } => {
                    debug!(id = %self.id, %n, %promised, "acceptor: ignored accept");
                    Vec::new()
                }
            },
            Message::Promise { n, accepted } => self.on_promise(from, n, accepted),
            Message::PrepareFailed { n } => {
                let Some(proposer) = self.proposer.as_mut() else {
                    trace!(id = %self.id, %n, "not a proposer, dropping prepare-failed");
                    return Vec::new();
                };
                match proposer.handle_prepare_failed(n) {
                    RejectionOutcome::Abandoned => {
                        debug!(id = %self.id, %n, %from, "proposer: prepare rejected, attempt abandoned");
                    }
                    RejectionOutcome::Stale => {
                        trace!(id = %self.id, %n, "proposer: stale prepare-failed");
                    }
                }
                Vec::new()
            }
            Message::Accepted { n, value } => match self.learner.handle_accepted(from, n, value) {
                LearnOutcome::Decided(decision) => {
                    debug!(id = %self.id, n = %decision.proposal, value = ?decision.value, "learner: consensus reached");
                    self.finish();
                    vec![Outgoing::broadcast(Message::Decide {
                        n: decision.proposal,
                        value: decision.value,
                    })]
                }
                LearnOutcome::Pending => {
                    trace!(id = %self.id, %n, tally = self.learner.tally(n), "learner: counted accepted");
                    Vec::new()
                }
                LearnOutcome::AlreadyDecided => Vec::new(),
            },
            Message::Decide { n, value } => {
                if let Some(decision) = self.learner.handle_decide(n, value) {
                    debug!(id = %self.id, %n, value = ?decision.value, %from, "learner: decide received");
                }
                self.finish();
                Vec::new()
            }
        }
    }

    fn on_promise(
        &mut self,
        from: ProcessId,
        n: ProposalNumber,
        accepted: Option<(ProposalNumber, V)>,
    ) -> Vec<Outgoing<V>> {
        let Some(proposer) = self.proposer.as_mut() else {
            trace!(id = %self.id, %n, "not a proposer, dropping promise");
            return Vec::new();
        };
        let adopted_before = proposer.max_accepted_seen();
        match proposer.handle_promise(from, n, accepted) {
            PromiseOutcome::Stale => {
                trace!(id = %self.id, %n, %from, "proposer: stale promise");
                Vec::new()
            }
            outcome => {
                if proposer.max_accepted_seen() != adopted_before {
                    debug!(
                        id = %self.id,
                        na = ?proposer.max_accepted_seen(),
                        value = ?proposer.candidate(),
                        "proposer: observed higher accepted proposal, adopting its value"
                    );
                }
                match outcome {
                    PromiseOutcome::Quorum(accept) => {
                        debug!(id = %self.id, %n, value = ?proposer.candidate(), "proposer: majority reached, sending accept");
                        vec![Outgoing::broadcast(accept)]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn finish(&mut self) {
        if let Some(proposer) = self.proposer.as_mut() {
            proposer.finish();
        }
    }
}
