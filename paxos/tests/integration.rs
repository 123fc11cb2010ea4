use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use single_decree_paxos::core::ProposerPhase;
use single_decree_paxos::{
    BackoffConfig, ClusterConfig, Decision, DecisionSource, Message, Outgoing, Process, ProcessId,
    ProposalNumber, ProposerConfig, RunOptions, Target, run_cluster,
};

/// Initialize tracing for tests. Call at the start of each test.
/// Uses RUST_LOG env var for filtering (defaults to "debug" for this crate).
fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("single_decree_paxos=debug")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_test_writer()
        .finish();

    // Thread-local default, dropped with the guard
    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

// --- Deterministic scheduler ---

/// A message in flight between two processes.
#[derive(Debug, Clone)]
struct InFlight {
    from: ProcessId,
    to: ProcessId,
    message: Message<u64>,
}

/// Drives [`Process`] state machines by hand, choosing which message is
/// delivered next. Delivery stays FIFO per (sender, receiver) pair.
struct Scheduler {
    processes: Vec<Process<u64>>,
    in_flight: VecDeque<InFlight>,
    decides_sent: usize,
}

impl Scheduler {
    fn new(num_processes: usize, proposers: &[(usize, u64)]) -> Self {
        let processes = (0..num_processes)
            .map(|id| {
                let proposal = proposers.iter().find(|(p, _)| *p == id).map(|(_, v)| *v);
                Process::new(ProcessId(id), num_processes, proposal)
            })
            .collect();
        Self {
            processes,
            in_flight: VecDeque::new(),
            decides_sent: 0,
        }
    }

    fn num_processes(&self) -> usize {
        self.processes.len()
    }

    fn process(&self, id: usize) -> &Process<u64> {
        &self.processes[id]
    }

    fn start(&mut self, id: usize) {
        let outgoing = self.processes[id].start();
        self.enqueue(ProcessId(id), outgoing);
    }

    fn retry(&mut self, id: usize) {
        let outgoing = self.processes[id].retry();
        self.enqueue(ProcessId(id), outgoing);
    }

    fn enqueue(&mut self, from: ProcessId, outgoing: Vec<Outgoing<u64>>) {
        for Outgoing { target, message } in outgoing {
            if matches!(message, Message::Decide { .. }) {
                self.decides_sent += 1;
            }
            match target {
                Target::Process(to) => self.in_flight.push_back(InFlight { from, to, message }),
                Target::All => {
                    for to in 0..self.num_processes() {
                        self.in_flight.push_back(InFlight {
                            from,
                            to: ProcessId(to),
                            message: message.clone(),
                        });
                    }
                }
            }
        }
    }

    /// Indices of messages at the head of their (sender, receiver) link.
    fn deliverable(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        self.in_flight
            .iter()
            .enumerate()
            .filter(|(_, m)| seen.insert((m.from, m.to)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Deliver one message and return what the receiver sent in response.
    fn deliver_at(&mut self, index: usize) -> Vec<Outgoing<u64>> {
        let Some(InFlight { from, to, message }) = self.in_flight.remove(index) else {
            return Vec::new();
        };
        let outgoing = self.processes[to.0].handle(from, message);
        self.enqueue(to, outgoing.clone());
        outgoing
    }

    /// Deliver the oldest deliverable message matching `pred`, if any.
    fn deliver_first(&mut self, pred: impl Fn(&InFlight) -> bool) -> Option<Vec<Outgoing<u64>>> {
        let found = self
            .deliverable()
            .into_iter()
            .find(|&i| pred(&self.in_flight[i]))?;
        Some(self.deliver_at(found))
    }

    fn deliver_while(&mut self, pred: impl Fn(&InFlight) -> bool) {
        while self.deliver_first(&pred).is_some() {}
    }

    fn run_to_quiescence(&mut self) {
        self.deliver_while(|_| true);
    }

    fn decisions(&self) -> Vec<Option<&Decision<u64>>> {
        self.processes.iter().map(Process::decision).collect()
    }

    fn decided_values(&self) -> BTreeSet<u64> {
        self.processes
            .iter()
            .filter_map(|p| p.decision().map(|d| d.value))
            .collect()
    }
}

fn number_of(message: &Message<u64>, num_processes: usize) -> ProcessId {
    message.proposal_number().proposer(num_processes)
}

// --- Scenario tests on the deterministic scheduler ---

#[test]
fn scenario_a_single_active_proposer() {
    let _guard = init_tracing();
    let mut sched = Scheduler::new(3, &[(0, 1000)]);
    sched.start(0);
    sched.run_to_quiescence();

    assert_eq!(sched.decided_values(), BTreeSet::from([1000]));
    assert!(sched.decisions().iter().all(Option::is_some));
    assert!(sched.decides_sent >= 1);
    assert_eq!(
        sched.process(0).proposer_phase(),
        Some(ProposerPhase::Done)
    );
}

#[test]
fn scenario_b_first_proposer_completes_before_rival_prepares() {
    let _guard = init_tracing();
    let n = 5;
    let mut sched = Scheduler::new(n, &[(0, 1000), (1, 1001)]);
    sched.start(0);
    sched.start(1);

    // Proposer 0's traffic goes first, all the way through to the decision
    sched.deliver_while(|m| number_of(&m.message, n) == ProcessId(0));
    assert_eq!(sched.decided_values(), BTreeSet::from([1000]));

    sched.run_to_quiescence();
    assert_eq!(sched.decided_values(), BTreeSet::from([1000]));
    assert!(sched.decisions().iter().all(Option::is_some));
}

#[test]
fn scenario_b_rival_adopts_accepted_value() {
    let _guard = init_tracing();
    let n = 5;
    let mut sched = Scheduler::new(n, &[(0, 1000), (1, 1001)]);
    sched.start(0);
    sched.start(1);

    // Proposer 0 completes its prepare round
    sched.deliver_while(|m| {
        number_of(&m.message, n) == ProcessId(0)
            && matches!(m.message, Message::Prepare { .. } | Message::Promise { .. })
    });
    assert_eq!(
        sched.process(0).proposer_phase(),
        Some(ProposerPhase::AwaitingAccepts)
    );

    // Its accept reaches acceptors 2 and 3 only: short of a quorum
    sched.deliver_while(|m| {
        matches!(m.message, Message::Accept { .. })
            && (m.to == ProcessId(2) || m.to == ProcessId(3))
    });
    let p0 = ProposalNumber::new(1, ProcessId(0), n);
    assert_eq!(sched.process(2).acceptor().accepted(), Some(&(p0, 1000)));
    assert_eq!(sched.process(3).acceptor().accepted(), Some(&(p0, 1000)));
    assert!(sched.decided_values().is_empty());

    // Proposer 1's prepare round runs; any quorum of promises includes 2 or 3
    sched.deliver_while(|m| {
        let prepare_round = number_of(&m.message, n) == ProcessId(1)
            && matches!(m.message, Message::Prepare { .. } | Message::Promise { .. });
        let accepted_to_rival =
            m.to == ProcessId(1) && matches!(m.message, Message::Accepted { .. });
        prepare_round || accepted_to_rival
    });
    assert!(sched.decided_values().is_empty());
    let rival = sched.process(1).proposer().unwrap();
    assert_eq!(rival.phase(), ProposerPhase::AwaitingAccepts);
    assert_eq!(*rival.candidate(), 1000);
    assert_eq!(rival.max_accepted_seen(), Some(p0));

    sched.run_to_quiescence();
    assert_eq!(sched.decided_values(), BTreeSet::from([1000]));
}

#[test]
fn contested_prepare_higher_number_wins() {
    let _guard = init_tracing();
    let n = 5;
    let mut sched = Scheduler::new(n, &[(0, 1000), (1, 1001)]);
    sched.start(0);
    sched.start(1);

    // Both prepare rounds complete before either accept is delivered
    for proposer in [ProcessId(0), ProcessId(1)] {
        sched.deliver_while(|m| {
            number_of(&m.message, n) == proposer && !matches!(m.message, Message::Accept { .. })
        });
    }

    let p0 = ProposalNumber::new(1, ProcessId(0), n);
    let p1 = ProposalNumber::new(1, ProcessId(1), n);
    assert!(p1 > p0);

    sched.run_to_quiescence();
    // Proposer 0's accept is dropped by every acceptor that promised p1
    assert_eq!(sched.decided_values(), BTreeSet::from([1001]));
    assert!(
        sched
            .decisions()
            .iter()
            .flatten()
            .all(|d| d.proposal == p1)
    );
}

#[test]
fn rejected_proposer_sends_nothing_more() {
    let _guard = init_tracing();
    let n = 3;
    let mut sched = Scheduler::new(n, &[(0, 1000), (2, 1002)]);
    sched.start(2);
    // Proposer 2's prepare (n=5) reaches acceptor 1 first
    sched.deliver_first(|m| m.to == ProcessId(1) && matches!(m.message, Message::Prepare { .. }));
    sched.start(0);

    // Proposer 0's prepare (n=3) is turned down by acceptor 1
    let p0 = ProposalNumber::new(1, ProcessId(0), n);
    let reply = sched.deliver_first(|m| m.from == ProcessId(0) && m.to == ProcessId(1));
    assert_eq!(
        reply,
        Some(vec![Outgoing::to(
            ProcessId(0),
            Message::PrepareFailed { n: p0 }
        )])
    );

    // The rejection abandons the attempt without sending anything
    let reply = sched.deliver_first(|m| {
        m.to == ProcessId(0) && matches!(m.message, Message::PrepareFailed { .. })
    });
    assert_eq!(reply, Some(Vec::new()));
    assert_eq!(sched.process(0).proposer_phase(), Some(ProposerPhase::Idle));

    // A promise for the abandoned attempt arriving later is ignored too
    let reply = sched.deliver_first(|m| m.from == ProcessId(0) && m.to == ProcessId(0));
    assert_eq!(
        reply,
        Some(vec![Outgoing::to(
            ProcessId(0),
            Message::Promise {
                n: p0,
                accepted: None
            }
        )])
    );
    let reply = sched.deliver_first(|m| {
        m.to == ProcessId(0) && matches!(m.message, Message::Promise { .. })
    });
    assert_eq!(reply, Some(Vec::new()));
    assert_eq!(sched.process(0).proposer_phase(), Some(ProposerPhase::Idle));
    assert_eq!(sched.process(0).proposer().unwrap().attempts(), 1);
}

#[test]
fn random_interleavings_never_decide_two_values() {
    let _guard = init_tracing();
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 5;
        let mut sched = Scheduler::new(n, &[(0, 1000), (1, 1001), (2, 1002)]);
        for id in 0..3 {
            sched.start(id);
        }

        let mut steps = 0;
        loop {
            let choices = sched.deliverable();
            if choices.is_empty() || steps > 5_000 {
                break;
            }
            let pick = choices[rng.random_range(0..choices.len())];
            sched.deliver_at(pick);
            steps += 1;

            // Idle proposers occasionally retry, up to a few attempts
            for id in 0..3 {
                let idle = sched.process(id).proposer().is_some_and(|p| {
                    p.phase() == ProposerPhase::Idle && p.attempts() < 4
                });
                if idle && rng.random_bool(0.3) {
                    sched.retry(id);
                }
            }

            assert!(sched.decided_values().len() <= 1, "seed {seed}: two values decided");
        }

        for process in &sched.processes {
            if let Some(d) = process.decision()
                && d.source == DecisionSource::Quorum
            {
                assert!(process.learner().tally(d.proposal) >= process.learner().quorum());
            }
        }
    }
}

// --- Tokio cluster tests ---

#[tokio::test(start_paused = true)]
async fn cluster_single_active_proposer_decides_its_value() {
    let _guard = init_tracing();
    let config = ClusterConfig::new(3, [(ProcessId(0), 1000_u64)]).unwrap();
    let options = RunOptions {
        timeout: Some(Duration::from_secs(5)),
        ..RunOptions::default()
    };

    let decisions = run_cluster(&config, options).await.unwrap();
    assert_eq!(decisions.len(), 3);
    assert!(decisions.iter().all(|d| d.value == 1000));
}

#[tokio::test(start_paused = true)]
async fn cluster_staggered_proposers_decide_first_value() {
    let _guard = init_tracing();
    let config = ClusterConfig::new(
        5,
        [
            (ProcessId(0), 1000_u64),
            (ProcessId(1), 1001),
            (ProcessId(2), 1002),
        ],
    )
    .unwrap();
    let options = RunOptions {
        stagger: Duration::from_millis(100),
        timeout: Some(Duration::from_secs(5)),
        ..RunOptions::default()
    };

    let decisions = run_cluster(&config, options).await.unwrap();
    assert_eq!(decisions.len(), 5);
    assert!(decisions.iter().all(|d| d.value == 1000));
}

#[tokio::test(start_paused = true)]
async fn cluster_retrying_proposers_agree() {
    let _guard = init_tracing();
    let proposers = (0..4).map(|id| (ProcessId(id), 2000 + id as u64));
    let config = ClusterConfig::new(5, proposers).unwrap();
    let proposer = ProposerConfig::with_retry(BackoffConfig::default(), 20)
        .phase_timeout(Duration::from_millis(200))
        .seed(42);
    let options = RunOptions {
        proposer,
        stagger: Duration::ZERO,
        timeout: Some(Duration::from_secs(60)),
    };

    let decisions = run_cluster(&config, options).await.unwrap();
    assert_eq!(decisions.len(), 5);
    let values: BTreeSet<u64> = decisions.iter().map(|d| d.value).collect();
    assert_eq!(values.len(), 1);
    assert!((2000..2004).contains(values.first().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn cluster_one_shot_contention_never_splits() {
    let _guard = init_tracing();
    let proposers = (0..3).map(|id| (ProcessId(id), 3000 + id as u64));
    let config = ClusterConfig::new(3, proposers).unwrap();
    let options = RunOptions {
        timeout: Some(Duration::from_secs(2)),
        ..RunOptions::default()
    };

    // Without retries every proposer may be rejected for good; the only
    // acceptable failure is then the overall timeout.
    match run_cluster(&config, options).await {
        Ok(decisions) => {
            assert_eq!(decisions.len(), 3);
            let values: BTreeSet<u64> = decisions.iter().map(|d| d.value).collect();
            assert_eq!(values.len(), 1);
            assert!((3000..3003).contains(values.first().unwrap()));
        }
        Err(err) => {
            let report = format!("{err:?}");
            assert!(report.contains("no decision everywhere within"), "{report}");
        }
    }
}
