//! Observable state snapshots for invariant checking.
//!
//! A snapshot is read through each party's oracle store, past the chaos
//! layer, so taking one never injects failures or consumes chaos rolls.

use std::collections::BTreeMap;

use axolotl_core::{
    Address, SenderKeyName, SessionRecord, StorageError,
    storage::{SenderKeyStore, SessionStore},
};

use crate::party::SimParty;

/// State of the whole simulation at one point in time.
#[derive(Debug, Clone, Default)]
pub struct SimSnapshot {
    /// One entry per party, in party index order.
    pub parties: Vec<PartySnapshot>,
    /// Every successful decrypt so far.
    pub deliveries: Vec<DeliveryRecord>,
}

impl SimSnapshot {
    /// Read every party's sessions towards every other party, and every
    /// sender key record for `groups`.
    pub fn capture(
        parties: &[SimParty],
        groups: &[String],
        deliveries: Vec<DeliveryRecord>,
    ) -> Result<Self, StorageError> {
        let parties = parties
            .iter()
            .map(|party| PartySnapshot::capture(party, parties, groups))
            .collect::<Result<_, _>>()?;
        Ok(Self { parties, deliveries })
    }
}

/// One party's stored protocol state.
#[derive(Debug, Clone, Default)]
pub struct PartySnapshot {
    /// Party name.
    pub name: String,
    /// Session records, keyed by peer index. Peers without a record are
    /// absent.
    pub sessions: BTreeMap<usize, SessionSnapshot>,
    /// Sender key records held, own and other members'.
    pub sender_keys: Vec<SenderKeySnapshot>,
}

impl PartySnapshot {
    fn capture(
        party: &SimParty,
        everyone: &[SimParty],
        groups: &[String],
    ) -> Result<Self, StorageError> {
        let mut sessions = BTreeMap::new();
        for (index, peer) in everyone.iter().enumerate() {
            if peer.address() == party.address() {
                continue;
            }
            if let Some(record) = party.oracle().load_session(peer.address())? {
                sessions.insert(index, SessionSnapshot::from_record(&record));
            }
        }

        let mut sender_keys = Vec::new();
        for group in groups {
            for member in everyone {
                let name = SenderKeyName::new(group.as_str(), member.address().clone());
                if let Some(record) = party.oracle().load_sender_key(&name)? {
                    sender_keys.push(SenderKeySnapshot {
                        name: name.to_string(),
                        states: record.sender_key_states().count(),
                    });
                }
            }
        }

        Ok(Self { name: party.address().name().to_string(), sessions, sender_keys })
    }
}

/// Shape of one session record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Whether the record has a current state.
    pub has_current_state: bool,
    /// Archived states.
    pub archived_states: usize,
    /// Receiver chains on the current state.
    pub receiver_chains: usize,
    /// Largest skipped-key cache among those chains.
    pub max_skipped_keys: usize,
}

impl SessionSnapshot {
    /// Measure `record`.
    pub fn from_record(record: &SessionRecord) -> Self {
        let current = record.session_state();
        Self {
            has_current_state: current.is_some(),
            archived_states: record.previous_session_states().count(),
            receiver_chains: current.map_or(0, |state| state.receiver_chains().count()),
            max_skipped_keys: current
                .and_then(|state| state.receiver_chains().map(|chain| chain.skipped_len()).max())
                .unwrap_or(0),
        }
    }
}

/// Shape of one sender key record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeySnapshot {
    /// `group::sender`
    pub name: String,
    /// States held.
    pub states: usize,
}

/// One successful decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Envelope id.
    pub id: u64,
    /// Sending party index.
    pub from: usize,
    /// Receiving party index.
    pub to: usize,
    /// Whether it came through a group.
    pub group: bool,
    /// Plaintext the sender encrypted.
    pub expected: Vec<u8>,
    /// Plaintext the receiver got.
    pub actual: Vec<u8>,
}
