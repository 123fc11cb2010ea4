//! Pure state machine core for Paxos - no I/O, no async
//!
//! This module contains the core state transition logic that is shared between:
//! - The async runtime ([`crate::runner`])
//! - The Stateright model checker tests
//!
//! By extracting this logic, the model checker verifies the exact same state
//! transitions as the production code.
//!
//! # Modules
//!
//! - [`types`]: Core type definitions (`ProposalNumber`, `Message`, `Decision`)
//! - [`acceptor`]: Acceptor state machine (`AcceptorCore`)
//! - [`proposer`]: Proposer state machine (`ProposerCore`)
//! - [`learner`]: Learner state machine (`LearnerCore`)
//! - `quorum`: Distinct-voter tally (`QuorumCore`)

pub mod acceptor;
pub mod learner;
pub mod proposer;
pub(crate) mod quorum;
pub mod types;

pub use acceptor::{AcceptOutcome, AcceptorCore, PrepareOutcome};
pub use learner::{LearnOutcome, LearnerCore};
pub use proposer::{PromiseOutcome, ProposerCore, ProposerPhase, RejectionOutcome};
pub use types::{
    Decision, DecisionSource, Message, Outgoing, ProcessId, ProposalNumber, Target, quorum,
};
