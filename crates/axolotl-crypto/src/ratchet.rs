//! Double Ratchet key hierarchy
//!
//! # Security Properties
//!
//! - Forward Secrecy: a chain key only moves forward through `HMAC(ck, 0x02)`
//! - Break-in Recovery: every DH ratchet step mixes a fresh agreement into
//!   the root key
//! - Determinism: the same inputs always produce the same keys
//!
//! All operations are pure. Ratcheting returns a new value and callers
//! replace the stored one.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    curve::{PrivateKey, PublicKey},
    error::CryptoError,
    kdf::derive_array,
};

type HmacSha256 = Hmac<Sha256>;

/// HMAC input deriving the message key seed
const MESSAGE_KEY_SEED: u8 = 0x01;

/// HMAC input deriving the next chain key
const CHAIN_KEY_SEED: u8 = 0x02;

/// HKDF info for the handshake master secret
const HANDSHAKE_INFO: &[u8] = b"WhisperText";

/// HKDF info for DH ratchet steps
const RATCHET_INFO: &[u8] = b"WhisperRatchet";

/// HKDF info for message key expansion
const MESSAGE_KEYS_INFO: &[u8] = b"WhisperMessageKeys";

/// Length of the 0xFF prefix the handshake places before the DH outputs
pub const DISCONTINUITY_LENGTH: usize = 32;

/// Root and first chain key derived from a handshake master secret.
///
/// `master_secret` is the full HKDF input: the 32-byte 0xFF prefix followed
/// by the concatenated DH outputs.
pub fn initial_keys(master_secret: &[u8]) -> (RootKey, ChainKey) {
    let derived: [u8; 64] = derive_array(master_secret, None, HANDSHAKE_INFO);
    split_root_and_chain(derived)
}

fn split_root_and_chain(mut derived: [u8; 64]) -> (RootKey, ChainKey) {
    let mut root = [0u8; 32];
    let mut chain = [0u8; 32];
    root.copy_from_slice(&derived[..32]);
    chain.copy_from_slice(&derived[32..]);
    derived.zeroize();
    (RootKey::new(root), ChainKey::new(chain, 0))
}

/// Top-level ratchet secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKey {
    key: [u8; 32],
}

impl RootKey {
    /// Wrap a 32-byte root secret.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Raw root key bytes.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Perform one DH ratchet step.
    ///
    /// HKDF uses this root key as salt and the agreement as input, then
    /// splits the 64-byte output into the new root key and a chain key at
    /// index 0.
    ///
    /// # Errors
    ///
    /// - `NonContributoryAgreement` if the peer ratchet key is low-order
    pub fn create_chain(
        &self,
        their_ratchet_key: &PublicKey,
        our_ratchet_key: &PrivateKey,
    ) -> Result<(RootKey, ChainKey), CryptoError> {
        let mut shared = our_ratchet_key.calculate_agreement(their_ratchet_key)?;
        let derived: [u8; 64] = derive_array(&shared, Some(&self.key), RATCHET_INFO);
        shared.zeroize();
        Ok(split_root_and_chain(derived))
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootKey(<redacted>)")
    }
}

impl Drop for RootKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Per-direction symmetric ratchet secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    key: [u8; 32],
    index: u32,
}

impl ChainKey {
    /// Wrap a chain secret at `index`.
    pub fn new(key: [u8; 32], index: u32) -> Self {
        Self { key, index }
    }

    /// Raw chain key bytes.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Number of ratchet steps since this chain was created.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Successor chain key at `index + 1`.
    ///
    /// # Errors
    ///
    /// - `IndexOverflow` if the index is already `u32::MAX`
    pub fn next(&self) -> Result<ChainKey, CryptoError> {
        let Some(index) = self.index.checked_add(1) else {
            return Err(CryptoError::IndexOverflow { current: self.index });
        };
        Ok(ChainKey { key: self.base_material(CHAIN_KEY_SEED), index })
    }

    /// Message keys for the current index.
    pub fn message_keys(&self) -> MessageKeys {
        let mut seed = self.base_material(MESSAGE_KEY_SEED);
        let mut derived: [u8; 80] = derive_array(&seed, None, MESSAGE_KEYS_INFO);
        seed.zeroize();

        let mut keys = MessageKeys {
            cipher_key: [0u8; 32],
            mac_key: [0u8; 32],
            iv: [0u8; 16],
            counter: self.index,
        };
        keys.cipher_key.copy_from_slice(&derived[..32]);
        keys.mac_key.copy_from_slice(&derived[32..64]);
        keys.iv.copy_from_slice(&derived[64..]);
        derived.zeroize();
        keys
    }

    fn base_material(&self, seed: u8) -> [u8; 32] {
        hmac_seed(&self.key, seed)
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKey").field("index", &self.index).finish_non_exhaustive()
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// `HMAC-SHA256(key, [seed])`, shared with the sender-key chain.
pub(crate) fn hmac_seed(key: &[u8; 32], seed: u8) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(&[seed]);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Keys protecting a single message.
///
/// Single use: once consumed for decryption they are removed from every
/// cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
    iv: [u8; 16],
    counter: u32,
}

impl MessageKeys {
    /// AES-256 key.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    /// HMAC-SHA256 key for the message MAC.
    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }

    /// CBC initialization vector.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    /// Chain index these keys belong to.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageKeys").field("counter", &self.counter).finish_non_exhaustive()
    }
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
        self.iv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::curve::KeyPair;

    fn test_chain_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn message_keys_known_answer() {
        let chain = ChainKey::new(test_chain_key(), 0);
        let keys = chain.message_keys();

        assert_eq!(
            hex::encode(keys.cipher_key()),
            "86268814b41f5fd154659f26873660e3dbc8b205155c3b59b8570b015d773c0c"
        );
        assert_eq!(
            hex::encode(keys.mac_key()),
            "dea51fa5beca2618971c4292647b81e83f2b4edd03e0d292a87ec66e0163abdb"
        );
        assert_eq!(hex::encode(keys.iv()), "21cfd5b9956a1631f6b7b5b5bdf7b791");
        assert_eq!(keys.counter(), 0);
    }

    #[test]
    fn next_chain_key_known_answer() {
        let chain = ChainKey::new(test_chain_key(), 0);
        let next = chain.next().unwrap();

        assert_eq!(
            hex::encode(next.key()),
            "4304c22c84a53755ab08ead8d97a8d429be5efa480682d7ad1da27f73e1fbe1d"
        );
        assert_eq!(next.index(), 1);
    }

    #[test]
    fn initial_keys_known_answer() {
        let mut master_secret = vec![0xFFu8; DISCONTINUITY_LENGTH];
        master_secret.extend(0u8..96);

        let (root, chain) = initial_keys(&master_secret);
        assert_eq!(
            hex::encode(root.key()),
            "88b7d6c6a7fe083f834252ca267f63a6f2cdabffe0a0d37034b13f6495d3c2ed"
        );
        assert_eq!(
            hex::encode(chain.key()),
            "4bea70f425ca160d28a71fb69ebec3bccf7722d890fcc8427a47d4943852411b"
        );
        assert_eq!(chain.index(), 0);
    }

    #[test]
    fn message_keys_do_not_advance_chain() {
        let chain = ChainKey::new(test_chain_key(), 7);
        let first = chain.message_keys();
        let second = chain.message_keys();

        assert_eq!(first, second);
        assert_eq!(first.counter(), 7);
        assert_eq!(chain.index(), 7);
    }

    #[test]
    fn consecutive_indices_produce_unique_keys() {
        let mut chain = ChainKey::new(test_chain_key(), 0);
        let mut seen = Vec::new();
        for _ in 0..16 {
            let keys = chain.message_keys();
            assert!(!seen.contains(keys.cipher_key()), "keys must be unique");
            seen.push(*keys.cipher_key());
            chain = chain.next().unwrap();
        }
    }

    #[test]
    fn next_rejects_index_overflow() {
        let chain = ChainKey::new(test_chain_key(), u32::MAX);
        assert_eq!(chain.next().unwrap_err(), CryptoError::IndexOverflow { current: u32::MAX });
    }

    #[test]
    fn create_chain_agrees_on_both_sides() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let root = RootKey::new([9u8; 32]);
        let alice = KeyPair::generate(&mut rng);
        let bob = KeyPair::generate(&mut rng);

        let (alice_root, alice_chain) =
            root.create_chain(&bob.public_key, &alice.private_key).unwrap();
        let (bob_root, bob_chain) = root.create_chain(&alice.public_key, &bob.private_key).unwrap();

        assert_eq!(alice_root, bob_root);
        assert_eq!(alice_chain, bob_chain);
        assert_eq!(alice_chain.index(), 0);
        assert_ne!(alice_root, root, "root key must move on every step");
    }

    #[test]
    fn create_chain_depends_on_root() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let alice = KeyPair::generate(&mut rng);
        let bob = KeyPair::generate(&mut rng);

        let (_, chain_a) =
            RootKey::new([1u8; 32]).create_chain(&bob.public_key, &alice.private_key).unwrap();
        let (_, chain_b) =
            RootKey::new([2u8; 32]).create_chain(&bob.public_key, &alice.private_key).unwrap();

        assert_ne!(chain_a, chain_b);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let chain = ChainKey::new(test_chain_key(), 3);
        assert_eq!(format!("{chain:?}"), "ChainKey { index: 3, .. }");
        assert_eq!(format!("{:?}", RootKey::new([1u8; 32])), "RootKey(<redacted>)");
    }
}
