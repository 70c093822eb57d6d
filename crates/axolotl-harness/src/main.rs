//! Axolotl simulation binary.
//!
//! # Usage
//!
//! ```bash
//! # Clean network, no storage failures
//! axolotl-sim --seed 7
//!
//! # Lossy, reordering network over flaky storage
//! axolotl-sim --drop-rate 0.1 --duplicate-rate 0.05 --reorder-window 4 \
//!     --storage-failure-rate 0.05
//! ```

use axolotl_harness::{NetworkConfig, SimConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Axolotl deterministic simulation
#[derive(Parser, Debug)]
#[command(name = "axolotl-sim")]
#[command(about = "Run pairwise and group sessions over a simulated faulty network")]
#[command(version)]
struct Args {
    /// Seed for every generator in the run
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of devices
    #[arg(short, long, default_value = "3")]
    parties: usize,

    /// Pairwise messages to send
    #[arg(short, long, default_value = "200")]
    messages: usize,

    /// Group messages to send
    #[arg(long, default_value = "50")]
    group_messages: usize,

    /// Probability that the network loses a message
    #[arg(long, default_value = "0.0", value_parser = parse_rate)]
    drop_rate: f64,

    /// Probability that the network delivers a message twice
    #[arg(long, default_value = "0.0", value_parser = parse_rate)]
    duplicate_rate: f64,

    /// How many of the oldest in-flight messages may arrive next
    #[arg(long, default_value = "1")]
    reorder_window: usize,

    /// Probability that a single store call fails
    #[arg(long, default_value = "0.0", value_parser = parse_rate)]
    storage_failure_rate: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("{value}: {e}"))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{rate} is not between 0.0 and 1.0"))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = SimConfig {
        seed: args.seed,
        parties: args.parties,
        messages: args.messages,
        group_messages: args.group_messages,
        network: NetworkConfig {
            drop_rate: args.drop_rate,
            duplicate_rate: args.duplicate_rate,
            reorder_window: args.reorder_window,
        },
        storage_failure_rate: args.storage_failure_rate,
        ..SimConfig::default()
    };

    let report = axolotl_harness::run(&config)?;
    if !report.is_clean() {
        return Err(format!(
            "{} unexpected outcomes, {} invariant violations",
            report.failures.len(),
            report.violations.len()
        )
        .into());
    }
    Ok(())
}
