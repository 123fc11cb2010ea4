//! Single-decree Paxos consensus library
//!
//! A fixed set of processes exchange point-to-point messages until at most one
//! value is chosen. Some processes propose; every process also acts as
//! acceptor and learner.
//!
//! # Architecture
//!
//! - **Proposers**: Drive an attempt through prepare/promise and accept/accepted
//! - **Acceptors**: Answer prepares and accepts according to their promise
//! - **Learners**: Count `Accepted` per proposal number and disseminate the decision
//!
//! The roles are pure state machines in [`core`], composed per process by
//! [`Process`]. [`run_process`] drives one process over the in-memory
//! [`network`]; [`run_cluster`] runs a whole cluster.
//!
//! # Quick Start
//!
//! ```ignore
//! use single_decree_paxos::{ClusterConfig, ProcessId, RunOptions, run_cluster};
//!
//! let config = ClusterConfig::new(3, [(ProcessId(0), 1000)])?;
//! let decisions = run_cluster(&config, RunOptions::default()).await?;
//! assert!(decisions.iter().all(|d| d.value == 1000));
//! ```

#![warn(clippy::pedantic)]

pub mod cluster;
pub mod config;
pub mod core;
pub mod network;
mod process;
mod runner;

pub use crate::core::{
    Decision, DecisionSource, Message, Outgoing, ProcessId, ProposalNumber, Target,
};
pub use cluster::{ClusterError, RunOptions, run_cluster};
pub use config::{BackoffConfig, ClusterConfig, ConfigError, ProposerConfig};
pub use process::Process;
pub use runner::{ProcessError, run_process};
