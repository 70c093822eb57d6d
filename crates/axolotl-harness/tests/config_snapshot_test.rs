//! Snapshot of the default simulation parameters, so changing a default is
//! a visible decision.

use axolotl_harness::SimConfig;

#[test]
fn default_config() {
    insta::assert_debug_snapshot!(SimConfig::default(), @r"
    SimConfig {
        seed: 0,
        parties: 3,
        messages: 200,
        group_messages: 50,
        network: NetworkConfig {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_window: 1,
        },
        storage_failure_rate: 0.0,
        max_attempts: 100,
    }
    ");
}
