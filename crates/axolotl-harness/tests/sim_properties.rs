//! Property-based tests for the simulation.
//!
//! 1. Any mix of network faults and storage failures leaves every invariant
//!    intact and every outcome explained
//! 2. Runs are reproducible from their config

use axolotl_harness::{NetworkConfig, SimConfig, run};
use proptest::prelude::*;

fn arbitrary_config() -> impl Strategy<Value = SimConfig> {
    (
        any::<u64>(),
        2usize..5,
        0.0f64..0.3,
        0.0f64..0.3,
        1usize..6,
        0.0f64..0.15,
    )
        .prop_map(|(seed, parties, drop_rate, duplicate_rate, reorder_window, storage)| SimConfig {
            seed,
            parties,
            messages: 40,
            group_messages: 10,
            network: NetworkConfig { drop_rate, duplicate_rate, reorder_window },
            storage_failure_rate: storage,
            ..SimConfig::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_faults_never_violate_invariants(config in arbitrary_config()) {
        let report = run(&config).unwrap();
        prop_assert!(report.is_clean(), "{:#?}", report);
    }

    #[test]
    fn prop_runs_are_reproducible(config in arbitrary_config()) {
        prop_assert_eq!(run(&config).unwrap(), run(&config).unwrap());
    }
}
