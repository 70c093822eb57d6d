//! Simulation runner
//!
//! Sets up `parties` devices, builds a session from every lower-indexed
//! party to every higher-indexed one, installs everyone's sender key for
//! one group, then interleaves pairwise sends, group sends and deliveries
//! over a [`SimNetwork`]. Transient storage failures are retried. At the
//! end the network is drained and the standard invariants are checked.
//!
//! Every decrypt outcome is classified:
//!
//! - success: logged for the invariants
//! - `DuplicateMessage` for an envelope already decrypted: expected replay
//! - `InvalidMac` / `InvalidMessage` for a pairwise envelope while
//!   reordering is on: the envelope's receiver chain was already evicted
//! - anything else: a failure

use std::collections::{HashMap, HashSet};

use axolotl_core::{ProtocolAddress, Result, SignalError};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;

use crate::{
    invariants::{DeliveryRecord, InvariantRegistry, SimSnapshot, Violation},
    network::{Envelope, NetworkConfig, NetworkStats, SimNetwork},
    party::{Received, SimParty},
};

const GROUP: &str = "sim-group";

/// Simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Seed for every generator in the run
    pub seed: u64,
    /// Number of devices
    pub parties: usize,
    /// Pairwise messages to send
    pub messages: usize,
    /// Group messages to send, each fanned out to every other member
    pub group_messages: usize,
    /// Network fault model
    pub network: NetworkConfig,
    /// Probability that any single store call fails
    pub storage_failure_rate: f64,
    /// Attempts per operation before a transient failure is final
    pub max_attempts: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            parties: 3,
            messages: 200,
            group_messages: 50,
            network: NetworkConfig::default(),
            storage_failure_rate: 0.0,
            max_attempts: 100,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimReport {
    /// Pairwise messages encrypted
    pub sent: usize,
    /// Group messages encrypted
    pub group_sent: usize,
    /// Pairwise envelopes decrypted
    pub delivered: usize,
    /// Group envelopes decrypted
    pub group_delivered: usize,
    /// Replays rejected as duplicates
    pub duplicates_rejected: usize,
    /// Pairwise envelopes rejected because their chain was evicted
    pub stale_rejected: usize,
    /// Retries caused by injected storage failures
    pub storage_retries: usize,
    /// Store calls made through the chaos layer
    pub storage_operations: usize,
    /// What the network did
    pub network: NetworkStats,
    /// Unexpected decrypt outcomes
    pub failures: Vec<String>,
    /// Invariant violations found at the end
    pub violations: Vec<Violation>,
}

impl SimReport {
    /// No failures and no violations.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.violations.is_empty()
    }
}

/// Run one simulation.
///
/// # Errors
///
/// Setup or send operations that still fail after `max_attempts`, or any
/// non-transient error from them.
///
/// # Panics
///
/// Panics if a rate in `config` is outside [0.0, 1.0]
pub fn run(config: &SimConfig) -> Result<SimReport> {
    tracing::info!(
        seed = config.seed,
        parties = config.parties,
        messages = config.messages,
        group_messages = config.group_messages,
        storage_failure_rate = config.storage_failure_rate,
        "starting simulation"
    );

    let mut sim = Simulation::new(*config);
    sim.setup()?;
    sim.exchange()?;
    sim.drain();
    let report = sim.finish()?;

    tracing::info!(
        sent = report.sent,
        delivered = report.delivered,
        group_sent = report.group_sent,
        group_delivered = report.group_delivered,
        duplicates_rejected = report.duplicates_rejected,
        stale_rejected = report.stale_rejected,
        storage_retries = report.storage_retries,
        failures = report.failures.len(),
        violations = report.violations.len(),
        "simulation finished"
    );
    Ok(report)
}

#[derive(Clone, Copy)]
enum Step {
    Pairwise,
    Group,
}

struct Simulation {
    config: SimConfig,
    rng: ChaCha20Rng,
    parties: Vec<SimParty>,
    network: SimNetwork,
    next_id: u64,
    expected: HashMap<u64, Vec<u8>>,
    deliveries: Vec<DeliveryRecord>,
    decrypted: HashSet<u64>,
    report: SimReport,
}

impl Simulation {
    fn new(config: SimConfig) -> Self {
        let parties = (0..config.parties)
            .map(|index| {
                let seed = config.seed.wrapping_mul(0x9E37_79B9).wrapping_add(index as u64 + 1);
                SimParty::new(&format!("party{index}"), seed, config.storage_failure_rate)
            })
            .collect();

        Self {
            config,
            rng: ChaCha20Rng::seed_from_u64(config.seed),
            parties,
            network: SimNetwork::new(config.network, config.seed ^ 0x4E45_5457),
            next_id: 0,
            expected: HashMap::new(),
            deliveries: Vec::new(),
            decrypted: HashSet::new(),
            report: SimReport::default(),
        }
    }

    fn address(&self, index: usize) -> ProtocolAddress {
        self.parties[index].address().clone()
    }

    /// Run `op` until it succeeds or fails for a reason other than storage.
    /// Returns the outcome and how many transient failures preceded it.
    fn with_retries<T>(
        max_attempts: u32,
        retries: &mut usize,
        mut op: impl FnMut() -> Result<T>,
    ) -> (Result<T>, u32) {
        let mut failures = 0;
        loop {
            match op() {
                Err(err) if err.is_transient() && failures + 1 < max_attempts => {
                    failures += 1;
                    *retries += 1;
                },
                outcome => return (outcome, failures),
            }
        }
    }

    fn setup(&mut self) -> Result<()> {
        let attempts = self.config.max_attempts;

        for party in &mut self.parties {
            Self::with_retries(attempts, &mut self.report.storage_retries, || {
                party.rotate_signed_pre_key()
            })
            .0?;
        }

        for responder in 1..self.parties.len() {
            let responder_address = self.address(responder);
            for initiator in 0..responder {
                let (bundle, _) =
                    Self::with_retries(attempts, &mut self.report.storage_retries, || {
                        self.parties[responder].publish_bundle()
                    });
                let bundle = bundle?;
                Self::with_retries(attempts, &mut self.report.storage_retries, || {
                    self.parties[initiator].start_session(&responder_address, &bundle)
                })
                .0?;
            }
        }

        if self.config.group_messages > 0 {
            for sender in 0..self.parties.len() {
                let sender_address = self.address(sender);
                let (distribution, _) =
                    Self::with_retries(attempts, &mut self.report.storage_retries, || {
                        self.parties[sender].distribution(GROUP)
                    });
                let distribution = distribution?;

                for member in (0..self.parties.len()).filter(|&member| member != sender) {
                    Self::with_retries(attempts, &mut self.report.storage_retries, || {
                        self.parties[member].receive(&sender_address, Some(GROUP), &distribution)
                    })
                    .0?;
                }
            }
        }

        tracing::debug!(parties = self.parties.len(), "setup complete");
        Ok(())
    }

    fn exchange(&mut self) -> Result<()> {
        let mut steps = vec![Step::Pairwise; self.config.messages];
        steps.extend(std::iter::repeat_n(Step::Group, self.config.group_messages));
        steps.shuffle(&mut self.rng);

        for step in steps {
            match step {
                Step::Pairwise => self.send_pairwise()?,
                Step::Group => self.send_group()?,
            }
            for _ in 0..self.rng.gen_range(0..=2) {
                self.deliver_one();
            }
        }
        Ok(())
    }

    fn send_pairwise(&mut self) -> Result<()> {
        let mut links = Vec::new();
        for from in 0..self.parties.len() {
            for to in (0..self.parties.len()).filter(|&to| to != from) {
                if self.parties[from].has_session(self.parties[to].address()) {
                    links.push((from, to));
                }
            }
        }
        let Some(&(from, to)) = links.choose(&mut self.rng) else {
            return Ok(());
        };

        let id = self.allocate_id();
        let plaintext = format!("{id}:{from}->{to}").into_bytes();
        let peer = self.address(to);
        let (payload, _) =
            Self::with_retries(self.config.max_attempts, &mut self.report.storage_retries, || {
                self.parties[from].encrypt(&peer, &plaintext)
            });

        self.expected.insert(id, plaintext);
        self.report.sent += 1;
        self.network.send(Envelope { id, from, to, group: None, payload: payload? });
        Ok(())
    }

    fn send_group(&mut self) -> Result<()> {
        if self.parties.len() < 2 {
            return Ok(());
        }
        let from = self.rng.gen_range(0..self.parties.len());
        let body = format!("{from}@{GROUP}#{}", self.report.group_sent);
        let (payload, _) =
            Self::with_retries(self.config.max_attempts, &mut self.report.storage_retries, || {
                self.parties[from].group_encrypt(GROUP, body.as_bytes())
            });
        let payload = payload?;
        self.report.group_sent += 1;

        for to in (0..self.parties.len()).filter(|&to| to != from) {
            let id = self.allocate_id();
            self.expected.insert(id, body.clone().into_bytes());
            self.network.send(Envelope {
                id,
                from,
                to,
                group: Some(GROUP.to_string()),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn drain(&mut self) {
        while self.network.in_flight() > 0 {
            self.deliver_one();
        }
    }

    fn deliver_one(&mut self) {
        let Some(envelope) = self.network.deliver() else {
            return;
        };
        let from = self.address(envelope.from);
        let to = envelope.to;
        let (outcome, transient) =
            Self::with_retries(self.config.max_attempts, &mut self.report.storage_retries, || {
                self.parties[to].receive(&from, envelope.group.as_deref(), &envelope.payload)
            });
        self.classify(&envelope, outcome, transient);
    }

    fn classify(&mut self, envelope: &Envelope, outcome: Result<Received>, transient: u32) {
        let id = envelope.id;
        let is_group = envelope.group.is_some();

        match outcome {
            Ok(Received::Plaintext(actual)) => {
                self.decrypted.insert(id);
                if is_group {
                    self.report.group_delivered += 1;
                } else {
                    self.report.delivered += 1;
                }
                self.deliveries.push(DeliveryRecord {
                    id,
                    from: envelope.from,
                    to: envelope.to,
                    group: is_group,
                    expected: self.expected.get(&id).cloned().unwrap_or_default(),
                    actual,
                });
            },
            Err(SignalError::DuplicateMessage { .. }) if self.decrypted.contains(&id) => {
                self.report.duplicates_rejected += 1;
            },
            Err(SignalError::InvalidMac | SignalError::InvalidMessage { .. })
                if !is_group && self.config.network.reorder_window > 1 =>
            {
                tracing::debug!(id, from = envelope.from, to = envelope.to, "stale envelope");
                self.report.stale_rejected += 1;
            },
            other => {
                let failure = format!(
                    "envelope {id} from {} to {} after {transient} storage retries: {other:?}",
                    envelope.from, envelope.to
                );
                tracing::warn!(%failure, "unexpected delivery outcome");
                self.report.failures.push(failure);
            },
        }
    }

    fn finish(mut self) -> Result<SimReport> {
        let groups =
            if self.config.group_messages > 0 { vec![GROUP.to_string()] } else { Vec::new() };
        let snapshot = SimSnapshot::capture(&self.parties, &groups, self.deliveries)?;

        if let Err(violations) = InvariantRegistry::standard().check_all(&snapshot) {
            for violation in &violations {
                tracing::error!(%violation, "invariant violated");
            }
            self.report.violations = violations;
        }

        self.report.network = self.network.stats();
        self.report.storage_operations =
            self.parties.iter().map(|party| party.store().operation_count()).sum();
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_conditions_deliver_everything() {
        let config = SimConfig { messages: 60, group_messages: 20, ..SimConfig::default() };
        let report = run(&config).unwrap();

        assert!(report.is_clean(), "{report:#?}");
        assert_eq!(report.sent, 60);
        assert_eq!(report.delivered, 60);
        assert_eq!(report.group_sent, 20);
        assert_eq!(report.group_delivered, 40);
        assert_eq!(report.storage_retries, 0);
    }

    #[test]
    fn single_party_sends_nothing() {
        let config = SimConfig { parties: 1, ..SimConfig::default() };
        let report = run(&config).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.sent, 0);
        assert_eq!(report.group_sent, 0);
    }

    #[test]
    fn same_seed_same_report() {
        let config = SimConfig {
            seed: 11,
            messages: 40,
            group_messages: 10,
            network: NetworkConfig { drop_rate: 0.1, duplicate_rate: 0.1, reorder_window: 3 },
            storage_failure_rate: 0.05,
            ..SimConfig::default()
        };
        assert_eq!(run(&config).unwrap(), run(&config).unwrap());
    }
}
