//! All session states held for one remote address
//!
//! The current state encrypts. Archived states are kept, most recent first,
//! so messages still in flight for a replaced session decrypt. A state that
//! successfully decrypts from the archive is promoted back to current.

use std::collections::VecDeque;

use axolotl_crypto::PublicKey;
use axolotl_proto::MessageVersion;
use serde::{Deserialize, Serialize};

use super::{SessionState, decode, encode};
use crate::{consts::ARCHIVED_STATES_MAX, storage::StorageError};

/// Current session state plus archived predecessors.
///
/// # Invariants
///
/// - At most [`ARCHIVED_STATES_MAX`] archived states.
/// - No two states share an `alice_base_key` after a promotion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record with no states.
    pub fn new_fresh() -> Self {
        Self::default()
    }

    /// A record whose current state is `state`.
    pub fn new(state: SessionState) -> Self {
        Self { current: Some(state), previous: VecDeque::new() }
    }

    /// Whether the record has never held a state.
    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    /// The state used for encryption.
    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    /// Archived states, most recent first.
    pub fn previous_session_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Whether any state (current or archived) was created by the handshake
    /// with base key `alice_base_key` at `version`.
    pub fn has_session_state(&self, version: MessageVersion, alice_base_key: &PublicKey) -> bool {
        self.current
            .iter()
            .chain(self.previous.iter())
            .any(|state| {
                state.session_version() == version && state.alice_base_key() == alice_base_key
            })
    }

    /// Move the current state into the archive. The record then has no
    /// current state.
    pub fn archive_current_state(&mut self) {
        if let Some(state) = self.current.take() {
            tracing::debug!(base_key = ?state.alice_base_key(), "archiving session state");
            self.previous.push_front(state);
            self.previous.truncate(ARCHIVED_STATES_MAX);
        }
    }

    /// Make `state` current, archiving whatever was current.
    ///
    /// Any archived state from the same handshake is dropped first.
    pub fn promote_state(&mut self, state: SessionState) {
        self.previous.retain(|old| old.alice_base_key() != state.alice_base_key());
        self.archive_current_state();
        self.current = Some(state);
    }

    /// Replace the archived state at `index` with `state` and make it
    /// current.
    pub(crate) fn promote_old_session(&mut self, index: usize, state: SessionState) {
        self.previous.remove(index);
        self.promote_state(state);
    }

    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// - `Serialization` if CBOR encoding fails
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        encode(self)
    }

    /// Decode a stored record.
    ///
    /// # Errors
    ///
    /// - `Serialization` if the bytes are not a valid record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        decode(bytes)
    }
}
