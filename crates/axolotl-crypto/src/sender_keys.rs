//! Sender-key chain for group messaging
//!
//! A single-direction symmetric ratchet: one sender, many readers, no DH
//! step. The chain advances with the same HMAC construction as the pairwise
//! chain key and expands message seeds with HKDF into an IV and AES key.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{error::CryptoError, kdf::derive_array, ratchet::hmac_seed};

/// HMAC input deriving a message seed
const MESSAGE_KEY_SEED: u8 = 0x01;

/// HMAC input deriving the next chain key
const CHAIN_KEY_SEED: u8 = 0x02;

/// HKDF info for sender message keys
const GROUP_INFO: &[u8] = b"WhisperGroup";

/// Chain key of a sender-key ratchet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChainKey {
    iteration: u32,
    chain_key: [u8; 32],
}

impl SenderChainKey {
    /// Wrap a chain seed at `iteration`.
    pub fn new(iteration: u32, chain_key: [u8; 32]) -> Self {
        Self { iteration, chain_key }
    }

    /// Current iteration.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw chain seed, as carried by distribution messages.
    pub fn seed(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Message key for the current iteration.
    pub fn sender_message_key(&self) -> SenderMessageKey {
        let mut seed = hmac_seed(&self.chain_key, MESSAGE_KEY_SEED);
        let key = SenderMessageKey::new(self.iteration, &seed);
        seed.zeroize();
        key
    }

    /// Successor chain key at `iteration + 1`.
    ///
    /// # Errors
    ///
    /// - `IndexOverflow` if the iteration is already `u32::MAX`
    pub fn next(&self) -> Result<SenderChainKey, CryptoError> {
        let Some(iteration) = self.iteration.checked_add(1) else {
            return Err(CryptoError::IndexOverflow { current: self.iteration });
        };
        Ok(SenderChainKey { iteration, chain_key: hmac_seed(&self.chain_key, CHAIN_KEY_SEED) })
    }
}

impl fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderChainKey").field("iteration", &self.iteration).finish_non_exhaustive()
    }
}

impl Drop for SenderChainKey {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

/// Key material for one group message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderMessageKey {
    iteration: u32,
    iv: [u8; 16],
    cipher_key: [u8; 32],
}

impl SenderMessageKey {
    /// Expand a message seed into IV and cipher key.
    pub fn new(iteration: u32, seed: &[u8; 32]) -> Self {
        let mut derived: [u8; 48] = derive_array(seed, None, GROUP_INFO);
        let mut key = Self { iteration, iv: [0u8; 16], cipher_key: [0u8; 32] };
        key.iv.copy_from_slice(&derived[..16]);
        key.cipher_key.copy_from_slice(&derived[16..]);
        derived.zeroize();
        key
    }

    /// Iteration this key belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// CBC initialization vector.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    /// AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }
}

impl fmt::Debug for SenderMessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderMessageKey").field("iteration", &self.iteration).finish_non_exhaustive()
    }
}

impl Drop for SenderMessageKey {
    fn drop(&mut self) {
        self.iv.zeroize();
        self.cipher_key.zeroize();
    }
}
