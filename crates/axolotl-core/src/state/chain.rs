//! Sending and receiving halves of a ratchet session

use std::collections::VecDeque;

use axolotl_crypto::{ChainKey, KeyPair, MessageKeys, PublicKey};
use serde::{Deserialize, Serialize};

use crate::consts::MAX_MESSAGE_KEYS;

/// Our current ratchet key pair and the chain it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChain {
    ratchet_key: KeyPair,
    chain_key: ChainKey,
}

impl SenderChain {
    /// Create a sender chain.
    pub fn new(ratchet_key: KeyPair, chain_key: ChainKey) -> Self {
        Self { ratchet_key, chain_key }
    }

    /// Ratchet key pair advertised in outgoing messages.
    pub fn ratchet_key(&self) -> &KeyPair {
        &self.ratchet_key
    }

    /// Next chain key to encrypt with.
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: ChainKey) {
        self.chain_key = chain_key;
    }
}

/// A chain opened by one of the remote party's ratchet keys.
///
/// Holds keys for messages that were skipped on this chain, in counter
/// order, bounded by [`MAX_MESSAGE_KEYS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
    message_keys: VecDeque<MessageKeys>,
}

impl ReceiverChain {
    /// Create a receiver chain with no skipped keys.
    pub fn new(ratchet_key: PublicKey, chain_key: ChainKey) -> Self {
        Self { ratchet_key, chain_key, message_keys: VecDeque::new() }
    }

    /// Remote ratchet key this chain belongs to.
    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    /// Chain key for the next counter not yet derived.
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    /// Number of skipped message keys held.
    pub fn skipped_len(&self) -> usize {
        self.message_keys.len()
    }

    /// Whether a skipped key for `counter` is held.
    pub fn has_message_keys(&self, counter: u32) -> bool {
        self.message_keys.iter().any(|keys| keys.counter() == counter)
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: ChainKey) {
        self.chain_key = chain_key;
    }

    /// Remove and return the skipped key for `counter`. Each key is handed
    /// out at most once.
    pub(crate) fn take_message_keys(&mut self, counter: u32) -> Option<MessageKeys> {
        let position = self.message_keys.iter().position(|keys| keys.counter() == counter)?;
        self.message_keys.remove(position)
    }

    pub(crate) fn push_message_keys(&mut self, keys: MessageKeys) {
        self.message_keys.push_back(keys);
        while self.message_keys.len() > MAX_MESSAGE_KEYS {
            if let Some(evicted) = self.message_keys.pop_front() {
                tracing::debug!(counter = evicted.counter(), "evicted skipped message keys");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ReceiverChain {
        ReceiverChain::new(PublicKey::from_point([9; 32]), ChainKey::new([1; 32], 0))
    }

    #[test]
    fn skipped_keys_are_single_use() {
        let mut chain = chain();
        let keys = ChainKey::new([1; 32], 4).message_keys();
        chain.push_message_keys(keys.clone());

        assert!(chain.has_message_keys(4));
        assert_eq!(chain.take_message_keys(4), Some(keys));
        assert!(!chain.has_message_keys(4));
        assert_eq!(chain.take_message_keys(4), None);
    }

    #[test]
    fn skipped_keys_evict_oldest() {
        let mut chain = chain();
        let mut chain_key = ChainKey::new([1; 32], 0);
        for _ in 0..MAX_MESSAGE_KEYS + 3 {
            chain.push_message_keys(chain_key.message_keys());
            chain_key = chain_key.next().unwrap();
        }

        assert_eq!(chain.skipped_len(), MAX_MESSAGE_KEYS);
        assert!(!chain.has_message_keys(2));
        assert!(chain.has_message_keys(3));
        assert!(chain.has_message_keys(MAX_MESSAGE_KEYS as u32 + 2));
    }
}
