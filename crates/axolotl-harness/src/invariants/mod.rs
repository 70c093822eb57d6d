//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after any schedule of sends,
//! drops, duplicates, reorderings and storage failures. The runner extracts
//! a [`SimSnapshot`] from every party's store and the delivery log, then
//! runs each registered [`Invariant`] against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SimSnapshot::capture(&parties, &groups, deliveries)?;
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    AtMostOnceDelivery, BoundedSenderKeys, BoundedSessionState, PlaintextIntegrity,
    SessionAfterDelivery,
};
pub use snapshot::{
    DeliveryRecord, PartySnapshot, SenderKeySnapshot, SessionSnapshot, SimSnapshot,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Which invariant a [`Violation`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantKind {
    /// [`BoundedSessionState`]
    BoundedSessionState,
    /// [`BoundedSenderKeys`]
    BoundedSenderKeys,
    /// [`AtMostOnceDelivery`]
    AtMostOnceDelivery,
    /// [`PlaintextIntegrity`]
    PlaintextIntegrity,
    /// [`SessionAfterDelivery`]
    SessionAfterDelivery,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Violated invariant.
    pub invariant: InvariantKind,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Which invariant this is.
    fn kind(&self) -> InvariantKind;

    /// `Ok(())` if the invariant holds.
    fn check(&self, state: &SimSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(BoundedSessionState);
        registry.add(BoundedSenderKeys);
        registry.add(AtMostOnceDelivery);
        registry.add(PlaintextIntegrity);
        registry.add(SessionAfterDelivery);
        registry
    }

    /// Add an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check everything, collecting all violations.
    pub fn check_all(&self, state: &SimSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&SimSnapshot::default()).is_ok());
    }

    #[test]
    fn violations_display_their_invariant() {
        let violation = Violation {
            invariant: InvariantKind::PlaintextIntegrity,
            message: "envelope 3".to_string(),
        };
        assert_eq!(violation.to_string(), "PlaintextIntegrity: envelope 3");
    }
}
