//! Fuzz target for whole simulations under storage and network chaos
//!
//! The fuzzer picks the seed, party count, traffic mix and fault rates.
//! Rates are scaled into ranges where retries can still make progress.
//!
//! # Invariants
//!
//! - `run` completes without panicking
//! - Every decrypt outcome is explained and no invariant is violated
//! - Every arrival is classified exactly once and the network drains

#![no_main]

use arbitrary::Arbitrary;
use axolotl_harness::{NetworkConfig, SimConfig, run};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    seed: u64,
    parties: u8,
    messages: u8,
    group_messages: u8,
    drop_rate: u8,
    duplicate_rate: u8,
    reorder_window: u8,
    storage_failure_rate: u8,
}

/// Map a byte onto `[0, max]`.
fn rate(byte: u8, max: f64) -> f64 {
    f64::from(byte) / f64::from(u8::MAX) * max
}

impl ChaosScenario {
    fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            parties: 2 + usize::from(self.parties % 4),
            messages: usize::from(self.messages % 64),
            group_messages: usize::from(self.group_messages % 16),
            network: NetworkConfig {
                drop_rate: rate(self.drop_rate, 0.5),
                duplicate_rate: rate(self.duplicate_rate, 0.5),
                reorder_window: 1 + usize::from(self.reorder_window % 8),
            },
            storage_failure_rate: rate(self.storage_failure_rate, 0.2),
            ..SimConfig::default()
        }
    }
}

fuzz_target!(|scenario: ChaosScenario| {
    let config = scenario.config();
    let report = run(&config).expect("simulation setup retries transient failures");

    assert!(report.is_clean(), "{config:?} produced {report:#?}");

    let outcomes = report.delivered
        + report.group_delivered
        + report.duplicates_rejected
        + report.stale_rejected;
    let network = report.network;
    assert_eq!(outcomes, network.delivered, "unclassified arrivals: {report:#?}");
    assert_eq!(
        network.delivered + network.dropped,
        network.sent + network.duplicated,
        "network did not drain"
    );
});
