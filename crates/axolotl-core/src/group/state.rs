//! Sender key chains as stored per (group, sender)

use std::collections::VecDeque;

use axolotl_crypto::{PrivateKey, PublicKey, SenderChainKey, SenderMessageKey};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{MAX_FORWARD_JUMPS, MAX_MESSAGE_KEYS, MAX_SENDER_KEY_STATES},
    error::{Result, SignalError},
    state::{decode, encode},
    storage::StorageError,
};

/// One sender chain with its signing key.
///
/// The sender holds the signing private key; members hold only the public
/// half and a cache of skipped message keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_key_public: PublicKey,
    signing_key_private: Option<PrivateKey>,
    message_keys: VecDeque<SenderMessageKey>,
}

impl SenderKeyState {
    /// Create a state whose chain starts at `iteration` with `chain_key`.
    pub fn new(
        key_id: u32,
        iteration: u32,
        chain_key: [u8; 32],
        signing_key_public: PublicKey,
        signing_key_private: Option<PrivateKey>,
    ) -> Self {
        Self {
            key_id,
            chain_key: SenderChainKey::new(iteration, chain_key),
            signing_key_public,
            signing_key_private,
            message_keys: VecDeque::new(),
        }
    }

    /// Sender key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Next chain key.
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    /// Public signing key messages are verified against.
    pub fn signing_key_public(&self) -> &PublicKey {
        &self.signing_key_public
    }

    /// Private signing key. Only the sender has it.
    pub fn signing_key_private(&self) -> Option<&PrivateKey> {
        self.signing_key_private.as_ref()
    }

    /// Whether a skipped key for `iteration` is held.
    pub fn has_sender_message_key(&self, iteration: u32) -> bool {
        self.message_keys.iter().any(|key| key.iteration() == iteration)
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    fn take_sender_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        let position = self.message_keys.iter().position(|key| key.iteration() == iteration)?;
        self.message_keys.remove(position)
    }

    fn push_sender_message_key(&mut self, key: SenderMessageKey) {
        self.message_keys.push_back(key);
        while self.message_keys.len() > MAX_MESSAGE_KEYS {
            if let Some(evicted) = self.message_keys.pop_front() {
                tracing::debug!(
                    key_id = self.key_id,
                    iteration = evicted.iteration(),
                    "evicted skipped sender message key"
                );
            }
        }
    }

    /// Message key for `iteration`, caching keys skipped on the way.
    ///
    /// # Errors
    ///
    /// - `DuplicateMessage` if `iteration` is behind the chain and not cached
    /// - `InvalidMessage` if `iteration` is more than [`MAX_FORWARD_JUMPS`]
    ///   ahead
    pub(crate) fn sender_message_key(&mut self, iteration: u32) -> Result<SenderMessageKey> {
        let chain_iteration = self.chain_key.iteration();
        if iteration < chain_iteration {
            return self.take_sender_message_key(iteration).ok_or_else(|| {
                tracing::debug!(
                    key_id = self.key_id,
                    chain_iteration,
                    iteration,
                    "rejected duplicate sender key message"
                );
                SignalError::DuplicateMessage { chain_index: chain_iteration, counter: iteration }
            });
        }

        let jump = iteration - chain_iteration;
        if jump > MAX_FORWARD_JUMPS {
            tracing::warn!(
                key_id = self.key_id,
                chain_iteration,
                iteration,
                "rejected sender key message too far in the future"
            );
            return Err(SignalError::InvalidMessage {
                reason: format!(
                    "iteration {iteration} is {jump} ahead of chain iteration {chain_iteration}"
                ),
            });
        }

        let mut chain_key = self.chain_key.clone();
        while chain_key.iteration() < iteration {
            self.push_sender_message_key(chain_key.sender_message_key());
            chain_key = chain_key.next()?;
        }

        let key = chain_key.sender_message_key();
        self.chain_key = chain_key.next()?;
        Ok(key)
    }
}

/// Sender key states for one (group, sender), newest first.
///
/// # Invariants
///
/// - At most [`MAX_SENDER_KEY_STATES`] states.
/// - Key ids are unique within the record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the record holds no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Newest state.
    pub fn sender_key_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub(crate) fn sender_key_state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    /// State with `key_id`, if held.
    pub fn sender_key_state_for_id(&self, key_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.key_id() == key_id)
    }

    pub(crate) fn sender_key_state_for_id_mut(&mut self, key_id: u32) -> Option<&mut SenderKeyState> {
        self.states.iter_mut().find(|state| state.key_id() == key_id)
    }

    /// All states, newest first.
    pub fn sender_key_states(&self) -> impl Iterator<Item = &SenderKeyState> {
        self.states.iter()
    }

    /// Add `state` as the newest, replacing any state with the same key id
    /// and evicting the oldest beyond the bound.
    pub fn add_sender_key_state(&mut self, state: SenderKeyState) {
        self.states.retain(|old| old.key_id() != state.key_id());
        self.states.push_front(state);
        self.states.truncate(MAX_SENDER_KEY_STATES);
    }

    /// Replace every state with `state`.
    pub fn set_sender_key_state(&mut self, state: SenderKeyState) {
        self.states.clear();
        self.states.push_front(state);
    }

    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// - `Serialization` if CBOR encoding fails
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, StorageError> {
        encode(self)
    }

    /// Decode a stored record.
    ///
    /// # Errors
    ///
    /// - `Serialization` if the bytes are not a valid record
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, StorageError> {
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn receiver_state(key_id: u32, iteration: u32) -> SenderKeyState {
        let mut rng = ChaCha20Rng::seed_from_u64(u64::from(key_id));
        SenderKeyState::new(key_id, iteration, [7; 32], KeyPair::generate(&mut rng).public_key, None)
    }

    fn expected_key(iteration: u32) -> SenderMessageKey {
        let mut chain = SenderChainKey::new(0, [7; 32]);
        while chain.iteration() < iteration {
            chain = chain.next().unwrap();
        }
        chain.sender_message_key()
    }

    #[test]
    fn in_order_keys_advance_chain() {
        let mut state = receiver_state(1, 0);
        for iteration in 0..3 {
            assert_eq!(state.sender_message_key(iteration).unwrap(), expected_key(iteration));
        }
        assert_eq!(state.chain_key().iteration(), 3);
        assert!(!state.has_sender_message_key(0));
    }

    #[test]
    fn skipped_keys_cached_and_single_use() {
        let mut state = receiver_state(1, 0);

        assert_eq!(state.sender_message_key(5).unwrap(), expected_key(5));
        assert!(state.has_sender_message_key(2));
        assert_eq!(state.sender_message_key(2).unwrap(), expected_key(2));
        assert_eq!(
            state.sender_message_key(2).unwrap_err(),
            SignalError::DuplicateMessage { chain_index: 6, counter: 2 }
        );
    }

    #[test]
    fn forward_jump_is_bounded() {
        let mut state = receiver_state(1, 0);
        let err = state.sender_message_key(MAX_FORWARD_JUMPS + 1).unwrap_err();

        assert!(matches!(err, SignalError::InvalidMessage { .. }));
        assert_eq!(state.chain_key().iteration(), 0);
    }

    #[test]
    fn late_joiner_cannot_read_history() {
        let mut state = receiver_state(1, 100);
        assert!(matches!(
            state.sender_message_key(99),
            Err(SignalError::DuplicateMessage { chain_index: 100, counter: 99 })
        ));
    }

    #[test]
    fn record_keeps_newest_five() {
        let mut record = SenderKeyRecord::new();
        for key_id in 1..=(MAX_SENDER_KEY_STATES as u32 + 2) {
            record.add_sender_key_state(receiver_state(key_id, 0));
        }

        let ids: Vec<_> = record.sender_key_states().map(SenderKeyState::key_id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4, 3]);
        assert!(record.sender_key_state_for_id(1).is_none());
        assert_eq!(record.sender_key_state().map(SenderKeyState::key_id), Some(7));
    }

    #[test]
    fn record_replaces_same_key_id() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(receiver_state(1, 0));
        record.add_sender_key_state(receiver_state(2, 0));
        record.add_sender_key_state(receiver_state(1, 9));

        let ids: Vec<_> = record.sender_key_states().map(SenderKeyState::key_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(record.sender_key_state_for_id(1).unwrap().chain_key().iteration(), 9);
    }

    #[test]
    fn set_replaces_everything() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(receiver_state(1, 0));
        record.add_sender_key_state(receiver_state(2, 0));
        record.set_sender_key_state(receiver_state(3, 0));

        let ids: Vec<_> = record.sender_key_states().map(SenderKeyState::key_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn cbor_roundtrip_with_private_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let signing = KeyPair::generate(&mut rng);
        let mut state = SenderKeyState::new(4, 0, [1; 32], signing.public_key, Some(signing.private_key));
        state.sender_message_key(3).unwrap();

        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(state);

        assert_eq!(SenderKeyRecord::from_bytes(&record.to_bytes().unwrap()).unwrap(), record);
    }
}
