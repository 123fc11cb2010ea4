//! Run a single-decree Paxos cluster in one process and print every decision.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use error_stack::{Report, ResultExt};
use single_decree_paxos::{
    BackoffConfig, ClusterConfig, ProcessId, ProposerConfig, RunOptions, run_cluster,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "paxos-sim")]
#[command(about = "Simulate single-decree Paxos among in-memory processes")]
struct Args {
    /// Total number of processes (at least 3)
    #[arg(short = 'n', long, default_value_t = 3)]
    processes: usize,

    /// Proposer ids; proposer `i` proposes `1000 + i`
    #[arg(short, long, value_delimiter = ',', default_value = "0,1,2")]
    proposers: Vec<usize>,

    /// Retry with jittered backoff after a rejected prepare
    #[arg(long)]
    retry: bool,

    /// Attempts per proposer when retrying
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Abandon an attempt that has not decided within this many milliseconds
    #[arg(long)]
    phase_timeout_ms: Option<u64>,

    /// Seed for retry jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Proposer `i` waits `stagger * (i % 3)` milliseconds before proposing
    #[arg(long, default_value_t = 100)]
    stagger_ms: u64,

    /// Give up if not every process has decided by then
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Debug)]
struct SimError;

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("simulation failed")
    }
}

impl std::error::Error for SimError {}

#[tokio::main]
async fn main() -> Result<(), Report<SimError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let proposers = args
        .proposers
        .iter()
        .map(|&id| (ProcessId(id), 1000 + id as u64));
    let config = ClusterConfig::new(args.processes, proposers).change_context(SimError)?;

    let mut proposer = if args.retry {
        ProposerConfig::with_retry(BackoffConfig::default(), args.max_attempts)
    } else {
        ProposerConfig::default()
    };
    if let Some(ms) = args.phase_timeout_ms {
        proposer = proposer.phase_timeout(Duration::from_millis(ms));
    }
    if let Some(seed) = args.seed {
        proposer = proposer.seed(seed);
    }

    let options = RunOptions {
        proposer,
        stagger: Duration::from_millis(args.stagger_ms),
        timeout: Some(Duration::from_millis(args.timeout_ms)),
    };

    let decisions = run_cluster(&config, options)
        .await
        .change_context(SimError)?;

    for (id, decision) in decisions.iter().enumerate() {
        info!(id, n = %decision.proposal, value = decision.value, source = ?decision.source, "decided");
        println!(
            "process {id}: value {} (proposal {}, {:?})",
            decision.value, decision.proposal, decision.source
        );
    }
    Ok(())
}
