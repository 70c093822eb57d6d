//! Lossy in-memory network
//!
//! Carries framed messages between simulated parties. Every send may be
//! dropped or duplicated, and delivery picks among the oldest
//! `reorder_window` envelopes: a message arrives ahead of at most
//! `reorder_window - 1` older ones, but may itself be held back
//! indefinitely. All randomness comes from one seeded generator.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A framed message in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Id assigned by the sender; duplicates share it
    pub id: u64,
    /// Sending party index
    pub from: usize,
    /// Receiving party index
    pub to: usize,
    /// Group the message belongs to, `None` for pairwise traffic
    pub group: Option<String>,
    /// `CiphertextMessage::to_framed` bytes
    pub payload: Vec<u8>,
}

/// Fault model of the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConfig {
    /// Probability that a send is lost
    pub drop_rate: f64,
    /// Probability that a send is delivered twice
    pub duplicate_rate: f64,
    /// 0 or 1 delivers in send order
    pub reorder_window: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { drop_rate: 0.0, duplicate_rate: 0.0, reorder_window: 1 }
    }
}

/// What the network did to the traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Envelopes handed to [`SimNetwork::send`]
    pub sent: usize,
    /// Envelopes lost
    pub dropped: usize,
    /// Extra copies injected
    pub duplicated: usize,
    /// Envelopes handed out by [`SimNetwork::deliver`]
    pub delivered: usize,
}

/// Seeded lossy queue.
pub struct SimNetwork {
    config: NetworkConfig,
    rng: ChaCha20Rng,
    in_flight: VecDeque<Envelope>,
    stats: NetworkStats,
}

impl SimNetwork {
    /// Empty network.
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            stats: NetworkStats::default(),
        }
    }

    /// Queue `envelope`, subject to loss and duplication.
    pub fn send(&mut self, envelope: Envelope) {
        self.stats.sent += 1;
        if self.rng.gen_bool(self.config.drop_rate) {
            self.stats.dropped += 1;
            tracing::trace!(id = envelope.id, from = envelope.from, to = envelope.to, "dropped");
            return;
        }
        if self.rng.gen_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            self.in_flight.push_back(envelope.clone());
        }
        self.in_flight.push_back(envelope);
    }

    /// Next envelope to arrive, if any is in flight.
    pub fn deliver(&mut self) -> Option<Envelope> {
        let window = self.config.reorder_window.max(1).min(self.in_flight.len());
        if window == 0 {
            return None;
        }
        let index = self.rng.gen_range(0..window);
        let envelope = self.in_flight.remove(index)?;
        self.stats.delivered += 1;
        Some(envelope)
    }

    /// Envelopes still queued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
}
