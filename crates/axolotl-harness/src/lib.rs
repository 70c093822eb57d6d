//! Deterministic simulation harness for axolotl sessions.
//!
//! Drives several devices through pairwise and group traffic over a lossy,
//! reordering network while their stores fail at random, then checks
//! behavioral invariants against what ended up in storage.
//!
//! - [`chaotic`]: store wrapper injecting seeded storage failures
//! - [`network`]: seeded drop / duplicate / reorder queue
//! - [`party`]: one simulated device
//! - [`invariants`]: snapshot extraction and invariant checks
//! - [`sim`]: the runner tying it together
//!
//! Everything is seeded; the same [`SimConfig`] always produces the same
//! [`SimReport`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaotic;
pub mod invariants;
pub mod network;
pub mod party;
pub mod sim;

pub use chaotic::ChaoticStore;
pub use invariants::{
    Invariant, InvariantKind, InvariantRegistry, InvariantResult, SimSnapshot, Violation,
};
pub use network::{Envelope, NetworkConfig, NetworkStats, SimNetwork};
pub use party::{Received, SimParty};
pub use sim::{SimConfig, SimReport, run};
