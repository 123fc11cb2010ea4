//! Hosting helper: run a whole cluster of processes inside one tokio runtime.

use std::fmt;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::config::{ClusterConfig, ProposerConfig};
use crate::core::Decision;
use crate::network::mesh;
use crate::process::Process;
use crate::runner::run_process;

/// The cluster did not finish with every process decided.
#[derive(Debug)]
pub struct ClusterError;

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cluster run failed")
    }
}

impl std::error::Error for ClusterError {}

/// Knobs for [`run_cluster`] beyond the static cluster description.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub proposer: ProposerConfig,
    /// Delay before proposer `id` starts: `stagger * (id % 3)`
    pub stagger: Duration,
    /// Bound on the whole run; `None` waits forever
    pub timeout: Option<Duration>,
}

/// Run every process of `config` to completion.
///
/// Returns one decision per process, indexed by process id.
///
/// # Errors
///
/// Returns [`ClusterError`] if a process fails or panics, or if the timeout
/// elapses first (a liveness failure, e.g. every one-shot proposer rejected).
#[instrument(skip_all, fields(processes = config.num_processes()))]
pub async fn run_cluster<V>(
    config: &ClusterConfig<V>,
    options: RunOptions,
) -> Result<Vec<Decision<V>>, Report<ClusterError>>
where
    V: Clone + fmt::Debug + Send + 'static,
{
    info!(
        quorum = config.quorum(),
        proposers = ?config.proposers().map(|(id, _)| id).collect::<Vec<_>>(),
        "starting cluster"
    );

    let mut tasks = JoinSet::new();
    for (id, endpoint) in config.process_ids().zip(mesh::<V>(config.num_processes())) {
        let process = Process::from_config(config, id);
        let proposer = options.proposer.clone();
        let delay = if config.is_proposer(id) {
            options.stagger * u32::try_from(id.0 % 3).unwrap_or_default()
        } else {
            Duration::ZERO
        };
        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (id, run_process(process, endpoint, proposer).await)
        });
    }

    let collect = async {
        let mut decisions: Vec<Option<Decision<V>>> = vec![None; config.num_processes()];
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = joined.change_context(ClusterError)?;
            let decision = result
                .change_context(ClusterError)
                .attach(format!("process {id}"))?;
            debug!(%id, n = %decision.proposal, "process decided");
            decisions[id.0] = Some(decision);
        }
        Ok::<_, Report<ClusterError>>(decisions.into_iter().flatten().collect())
    };

    match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, collect)
            .await
            .change_context(ClusterError)
            .attach(format!("no decision everywhere within {timeout:?}"))?,
        None => collect.await,
    }
}

