//! Standard invariant checks.

use std::collections::HashSet;

use axolotl_core::consts::{
    ARCHIVED_STATES_MAX, MAX_MESSAGE_KEYS, MAX_RECEIVER_CHAINS, MAX_SENDER_KEY_STATES,
};

use super::{Invariant, InvariantKind, InvariantResult, SimSnapshot, Violation};

/// Session records never outgrow their caps.
///
/// Archived states, receiver chains and skipped-key caches are all bounded;
/// a record past a cap means eviction stopped working.
pub struct BoundedSessionState;

impl Invariant for BoundedSessionState {
    fn kind(&self) -> InvariantKind {
        InvariantKind::BoundedSessionState
    }

    fn check(&self, state: &SimSnapshot) -> InvariantResult {
        for party in &state.parties {
            for (peer, session) in &party.sessions {
                let over = session.archived_states > ARCHIVED_STATES_MAX
                    || session.receiver_chains > MAX_RECEIVER_CHAINS
                    || session.max_skipped_keys > MAX_MESSAGE_KEYS;
                if over {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!("{} -> party {peer}: {session:?}", party.name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Sender key records hold at most five states.
pub struct BoundedSenderKeys;

impl Invariant for BoundedSenderKeys {
    fn kind(&self) -> InvariantKind {
        InvariantKind::BoundedSenderKeys
    }

    fn check(&self, state: &SimSnapshot) -> InvariantResult {
        for party in &state.parties {
            if let Some(record) =
                party.sender_keys.iter().find(|record| record.states > MAX_SENDER_KEY_STATES)
            {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "{} holds {} states for {}",
                        party.name, record.states, record.name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No envelope decrypts twice.
///
/// A replayed ciphertext must hit `DuplicateMessage`; decrypting it again
/// means a message key was reused.
pub struct AtMostOnceDelivery;

impl Invariant for AtMostOnceDelivery {
    fn kind(&self) -> InvariantKind {
        InvariantKind::AtMostOnceDelivery
    }

    fn check(&self, state: &SimSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for delivery in &state.deliveries {
            if !seen.insert(delivery.id) {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "envelope {} from {} to {} decrypted twice",
                        delivery.id, delivery.from, delivery.to
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every decrypt yields exactly what was encrypted.
pub struct PlaintextIntegrity;

impl Invariant for PlaintextIntegrity {
    fn kind(&self) -> InvariantKind {
        InvariantKind::PlaintextIntegrity
    }

    fn check(&self, state: &SimSnapshot) -> InvariantResult {
        if let Some(delivery) = state.deliveries.iter().find(|d| d.expected != d.actual) {
            return Err(Violation {
                invariant: self.kind(),
                message: format!(
                    "envelope {}: expected {:?}, got {:?}",
                    delivery.id,
                    String::from_utf8_lossy(&delivery.expected),
                    String::from_utf8_lossy(&delivery.actual)
                ),
            });
        }
        Ok(())
    }
}

/// A pairwise decrypt leaves the receiver with a current session towards
/// the sender.
pub struct SessionAfterDelivery;

impl Invariant for SessionAfterDelivery {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SessionAfterDelivery
    }

    fn check(&self, state: &SimSnapshot) -> InvariantResult {
        for delivery in state.deliveries.iter().filter(|d| !d.group) {
            let has_session = state
                .parties
                .get(delivery.to)
                .and_then(|party| party.sessions.get(&delivery.from))
                .is_some_and(|session| session.has_current_state);
            if !has_session {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "party {} decrypted envelope {} but holds no session to party {}",
                        delivery.to, delivery.id, delivery.from
                    ),
                });
            }
        }
        Ok(())
    }
}
