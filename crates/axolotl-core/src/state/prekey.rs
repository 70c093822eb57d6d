//! Prekey records and the bundle a responder publishes

use axolotl_crypto::{KeyPair, PublicKey};
use serde::{Deserialize, Serialize};

use super::{decode, encode};
use crate::storage::StorageError;

/// One-time prekey held by the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    /// Create a record.
    pub fn new(id: u32, key_pair: KeyPair) -> Self {
        Self { id, key_pair }
    }

    /// Prekey id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Prekey pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
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

/// Medium-term prekey, signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: u32,
    key_pair: KeyPair,
    signature: Vec<u8>,
    timestamp: u64,
}

impl SignedPreKeyRecord {
    /// Create a record. `signature` covers the 33-byte public key.
    pub fn new(id: u32, key_pair: KeyPair, signature: Vec<u8>, timestamp: u64) -> Self {
        Self { id, key_pair, signature, timestamp }
    }

    /// Signed prekey id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Signed prekey pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Identity signature over the public key.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Creation time in milliseconds since the epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
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

/// Public material an initiator needs to start a session without the
/// responder being online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    registration_id: u32,
    device_id: u32,
    pre_key: Option<(u32, PublicKey)>,
    signed_pre_key_id: u32,
    signed_pre_key: PublicKey,
    signed_pre_key_signature: Vec<u8>,
    identity_key: PublicKey,
}

impl PreKeyBundle {
    /// Assemble a bundle.
    pub fn new(
        registration_id: u32,
        device_id: u32,
        pre_key: Option<(u32, PublicKey)>,
        signed_pre_key_id: u32,
        signed_pre_key: PublicKey,
        signed_pre_key_signature: Vec<u8>,
        identity_key: PublicKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            pre_key,
            signed_pre_key_id,
            signed_pre_key,
            signed_pre_key_signature,
            identity_key,
        }
    }

    /// Responder's registration id.
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// Responder's device id.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// One-time prekey id, if the bundle carries one.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key.map(|(id, _)| id)
    }

    /// One-time prekey, if the bundle carries one.
    pub fn pre_key_public(&self) -> Option<&PublicKey> {
        self.pre_key.as_ref().map(|(_, key)| key)
    }

    /// Signed prekey id.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Signed prekey.
    pub fn signed_pre_key_public(&self) -> &PublicKey {
        &self.signed_pre_key
    }

    /// Identity signature over the signed prekey.
    pub fn signed_pre_key_signature(&self) -> &[u8] {
        &self.signed_pre_key_signature
    }

    /// Responder's identity key.
    pub fn identity_key(&self) -> &PublicKey {
        &self.identity_key
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn records_survive_storage_encoding() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let pre_key = PreKeyRecord::new(7, KeyPair::generate(&mut rng));
        let signed = SignedPreKeyRecord::new(3, KeyPair::generate(&mut rng), vec![1; 64], 1_700_000);

        assert_eq!(PreKeyRecord::from_bytes(&pre_key.to_bytes().unwrap()).unwrap(), pre_key);
        assert_eq!(SignedPreKeyRecord::from_bytes(&signed.to_bytes().unwrap()).unwrap(), signed);
    }

    #[test]
    fn bundle_without_one_time_prekey() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let key = KeyPair::generate(&mut rng).public_key;
        let bundle = PreKeyBundle::new(1, 1, None, 3, key, vec![0; 64], key);

        assert_eq!(bundle.pre_key_id(), None);
        assert!(bundle.pre_key_public().is_none());
        assert_eq!(bundle.signed_pre_key_id(), 3);
    }
}
