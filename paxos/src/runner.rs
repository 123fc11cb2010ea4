//! Process event loop.
//!
//! Each process runs one loop that blocks on its inbox, hands every message to
//! the [`Process`] state machine and sends what it returns. Handlers never
//! wait on each other, so the three roles share state without locks. The only
//! other wake-up source is the optional retry timer.

use std::fmt;

use error_stack::Report;
use rand::rngs::StdRng;
use tokio::select;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument, trace, warn};

use crate::config::ProposerConfig;
use crate::core::{Decision, ProposalNumber, ProposerPhase};
use crate::network::{Endpoint, Envelope};
use crate::process::Process;

/// A process stopped without learning the decision.
#[derive(Debug)]
pub struct ProcessError;

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("process stopped before a decision")
    }
}

impl std::error::Error for ProcessError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WakeupKind {
    /// Start a new attempt
    Retry,
    /// Give up on attempt `n` if it is still in flight
    PhaseTimeout(ProposalNumber),
}

#[derive(Clone, Copy, Debug)]
struct Wakeup {
    at: Instant,
    kind: WakeupKind,
}

/// Decides when an idle or stuck proposer should try again.
struct RetryTimer {
    config: ProposerConfig,
    rng: StdRng,
    wakeup: Option<Wakeup>,
    gave_up: bool,
}

impl RetryTimer {
    fn new(config: ProposerConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            wakeup: None,
            gave_up: false,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.wakeup.map(|w| w.at)
    }

    fn take(&mut self) -> Option<WakeupKind> {
        self.wakeup.take().map(|w| w.kind)
    }

    /// Re-arm the timer for the proposer's current phase.
    fn update<V: Clone + fmt::Debug>(&mut self, process: &Process<V>) {
        let Some(proposer) = process.proposer() else {
            self.wakeup = None;
            return;
        };

        match proposer.phase() {
            ProposerPhase::Idle => {
                if matches!(self.wakeup, Some(Wakeup { kind: WakeupKind::Retry, .. })) {
                    return;
                }
                let attempts = proposer.attempts();
                if self.config.may_retry(attempts) {
                    let backoff = self.config.retry.as_ref().map_or_else(Default::default, |b| {
                        b.delay(attempts.saturating_sub(1), &mut self.rng)
                    });
                    trace!(?backoff, attempts, "backing off before retry");
                    self.wakeup = Some(Wakeup {
                        at: Instant::now() + backoff,
                        kind: WakeupKind::Retry,
                    });
                } else {
                    self.wakeup = None;
                    if !self.gave_up {
                        self.gave_up = true;
                        if self.config.retry.is_some() {
                            warn!(attempts, "proposer gave up: retry budget exhausted");
                        } else {
                            debug!("one-shot proposer idle after rejection");
                        }
                    }
                }
            }
            ProposerPhase::AwaitingPromises | ProposerPhase::AwaitingAccepts => {
                let Some(n) = proposer.current_number() else {
                    return;
                };
                if matches!(self.wakeup, Some(Wakeup { kind: WakeupKind::PhaseTimeout(m), .. }) if m == n)
                {
                    return;
                }
                self.wakeup = match (&self.config.retry, self.config.phase_timeout) {
                    (Some(_), Some(timeout)) => Some(Wakeup {
                        at: Instant::now() + timeout,
                        kind: WakeupKind::PhaseTimeout(n),
                    }),
                    _ => None,
                };
            }
            ProposerPhase::Done => self.wakeup = None,
        }
    }
}

/// Run one process until it learns the decision.
///
/// Returns the decision, whether derived from a quorum of `Accepted` or
/// learned from another process's `Decide`.
///
/// # Errors
///
/// Returns [`ProcessError`] if every peer has gone away and the inbox is
/// drained before a decision is known.
#[instrument(skip_all, name = "process", fields(id = %process.id()))]
pub async fn run_process<V>(
    mut process: Process<V>,
    mut endpoint: Endpoint<V>,
    config: ProposerConfig,
) -> Result<Decision<V>, Report<ProcessError>>
where
    V: Clone + fmt::Debug,
{
    debug!(proposer = process.proposer().is_some(), "process started");
    let rng = config.rng_for(process.id());
    let mut timer = RetryTimer::new(config, rng);

    endpoint.dispatch(process.start());
    timer.update(&process);

    loop {
        if let Some(decision) = process.decision() {
            debug!(n = %decision.proposal, value = ?decision.value, source = ?decision.source, "process terminated");
            return Ok(decision.clone());
        }

        let deadline = timer.deadline();
        select! {
            envelope = endpoint.recv() => {
                let Some(Envelope { from, message }) = envelope else {
                    return Err(Report::new(ProcessError).attach("inbox closed before a decision"));
                };
                trace!(%from, kind = message.kind(), n = %message.proposal_number(), "received");
                let outgoing = process.handle(from, message);
                endpoint.dispatch(outgoing);
            }
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                match timer.take() {
                    Some(WakeupKind::Retry) => {
                        endpoint.dispatch(process.retry());
                    }
                    Some(WakeupKind::PhaseTimeout(n)) => {
                        let current = process.proposer().and_then(|p| p.current_number());
                        if current == Some(n) && process.abandon_attempt() {
                            debug!(%n, "attempt timed out");
                        }
                    }
                    None => {}
                }
            }
        }

        timer.update(&process);
    }
}
