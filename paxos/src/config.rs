//! Cluster and proposer configuration

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use error_stack::Report;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::{ProcessId, quorum};

/// Fewest processes for which a quorum needs more than one vote.
pub const MIN_PROCESSES: usize = 3;

/// Invalid cluster configuration.
#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid cluster configuration")
    }
}

impl std::error::Error for ConfigError {}

/// Static description of a cluster: its size and which processes propose what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig<V> {
    num_processes: usize,
    proposers: BTreeMap<ProcessId, V>,
}

impl<V> ClusterConfig<V> {
    /// Validate and build a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if there are fewer than [`MIN_PROCESSES`]
    /// processes, no proposers, or a proposer id outside `0..num_processes`.
    pub fn new(
        num_processes: usize,
        proposers: impl IntoIterator<Item = (ProcessId, V)>,
    ) -> Result<Self, Report<ConfigError>> {
        if num_processes < MIN_PROCESSES {
            return Err(Report::new(ConfigError).attach(format!(
                "at least {MIN_PROCESSES} processes are required, got {num_processes}"
            )));
        }

        let mut map = BTreeMap::new();
        for (id, value) in proposers {
            if id.0 >= num_processes {
                return Err(Report::new(ConfigError)
                    .attach(format!("proposer {id} is not one of {num_processes} processes")));
            }
            if map.insert(id, value).is_some() {
                return Err(Report::new(ConfigError).attach(format!("proposer {id} listed twice")));
            }
        }
        if map.is_empty() {
            return Err(Report::new(ConfigError).attach("at least one proposer is required"));
        }

        Ok(Self {
            num_processes,
            proposers: map,
        })
    }

    #[must_use]
    pub fn num_processes(&self) -> usize {
        self.num_processes
    }

    #[must_use]
    pub fn quorum(&self) -> usize {
        quorum(self.num_processes)
    }

    #[must_use]
    pub fn is_proposer(&self, id: ProcessId) -> bool {
        self.proposers.contains_key(&id)
    }

    /// Initial value proposed by `id`, if it is a proposer.
    #[must_use]
    pub fn proposal_for(&self, id: ProcessId) -> Option<&V> {
        self.proposers.get(&id)
    }

    pub fn proposers(&self) -> impl Iterator<Item = (ProcessId, &V)> {
        self.proposers.iter().map(|(id, v)| (*id, v))
    }

    pub fn process_ids(&self) -> impl Iterator<Item = ProcessId> + use<V> {
        (0..self.num_processes).map(ProcessId)
    }
}

/// Delay between proposer attempts: exponential growth, capped, with jitter.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial: Duration,
    /// Ceiling on the un-jittered delay
    pub max: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `retry` (zero-based), jittered to 50%..150%.
    #[must_use]
    pub fn delay(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let grown = self.initial.as_secs_f64() * self.multiplier.powi(retry.cast_signed());
        let capped = grown.min(self.max.as_secs_f64());
        Duration::from_secs_f64(capped * rng.random_range(0.5..1.5))
    }
}

/// Proposer behaviour after an attempt fails.
///
/// The default is one-shot: a rejected proposer stays idle for good.
#[derive(Debug, Clone)]
pub struct ProposerConfig {
    /// Backoff between attempts; `None` disables retries
    pub retry: Option<BackoffConfig>,
    /// Upper bound on attempts, the first one included
    pub max_attempts: u32,
    /// With retries enabled, abandon an attempt that has not led to a
    /// decision within this long
    pub phase_timeout: Option<Duration>,
    /// Seed for the jitter RNG; each process uses `seed + id`
    pub seed: Option<u64>,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            retry: None,
            max_attempts: 1,
            phase_timeout: None,
            seed: None,
        }
    }
}

impl ProposerConfig {
    /// Retry with `backoff` up to `max_attempts` attempts in total.
    #[must_use]
    pub fn with_retry(backoff: BackoffConfig, max_attempts: u32) -> Self {
        Self {
            retry: Some(backoff),
            max_attempts,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Whether a proposer that has made `attempts` attempts may try again.
    #[must_use]
    pub fn may_retry(&self, attempts: u32) -> bool {
        self.retry.is_some() && attempts < self.max_attempts
    }

    /// Jitter RNG for process `id`.
    #[must_use]
    pub fn rng_for(&self, id: ProcessId) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.0 as u64)),
            None => StdRng::from_os_rng(),
        }
    }
}
