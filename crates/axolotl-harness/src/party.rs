//! A simulated device
//!
//! Owns a [`MemoryStore`] behind a [`ChaoticStore`] plus its own seeded
//! generator. Every method is a single attempt; retrying transient storage
//! failures is left to the caller.

use axolotl_core::{
    Address, GroupCipher, MemoryStore, PreKeyBundle, ProtocolAddress, Result, SenderKeyName,
    SessionCipher, SignalError, keys,
    storage::{IdentityKeyStore, SessionStore, SignedPreKeyStore},
};
use axolotl_proto::CiphertextMessage;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::chaotic::ChaoticStore;

/// What a received payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Decrypted pairwise or group message
    Plaintext(Vec<u8>),
    /// A member's sender key was installed
    SenderKeyInstalled,
}

/// One device in the simulation.
pub struct SimParty {
    address: ProtocolAddress,
    store: ChaoticStore<MemoryStore>,
    rng: ChaCha20Rng,
}

impl SimParty {
    /// Fresh device with a new identity. `failure_rate` applies to every
    /// store call made through this party.
    pub fn new(name: &str, seed: u64, failure_rate: f64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let identity = keys::generate_identity_key_pair(&mut rng);
        let registration_id = keys::generate_registration_id(&mut rng);
        let store = ChaoticStore::with_seed(
            MemoryStore::new(identity, registration_id),
            failure_rate,
            seed ^ 0xC4A0_5EED,
        );
        Self { address: ProtocolAddress::new(name, 1), store, rng }
    }

    /// Address peers use for this party.
    pub fn address(&self) -> &ProtocolAddress {
        &self.address
    }

    /// Store as seen by the ciphers, failures included.
    pub fn store(&self) -> &ChaoticStore<MemoryStore> {
        &self.store
    }

    /// Store without failure injection, for oracle checks.
    pub fn oracle(&self) -> &MemoryStore {
        self.store.inner()
    }

    /// Generate the signed prekey that [`publish_bundle`](Self::publish_bundle)
    /// advertises.
    pub fn rotate_signed_pre_key(&mut self) -> Result<()> {
        let identity = IdentityKeyStore::<ProtocolAddress>::identity_key_pair(&self.store)?;
        keys::rotate_signed_pre_key(&self.store, &identity, &mut self.rng, 0)?;
        Ok(())
    }

    /// Mint one one-time prekey and publish it with the latest signed
    /// prekey.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyId` if no signed prekey was generated yet
    pub fn publish_bundle(&mut self) -> Result<PreKeyBundle> {
        let identity = IdentityKeyStore::<ProtocolAddress>::identity_key_pair(&self.store)?;
        let registration_id =
            IdentityKeyStore::<ProtocolAddress>::local_registration_id(&self.store)?;
        let signed_id = self.store.last_signed_pre_key_id()?;
        let signed = self
            .store
            .load_signed_pre_key(signed_id)?
            .ok_or(SignalError::InvalidKeyId { kind: "signed pre key", id: signed_id })?;
        let pre_key = keys::create_pre_keys(&self.store, &mut self.rng, 1)?.pop();

        Ok(PreKeyBundle::new(
            registration_id,
            self.address.device_id(),
            pre_key.map(|record| (record.id(), record.key_pair().public_key)),
            signed.id(),
            signed.key_pair().public_key,
            signed.signature().to_vec(),
            identity.public_key,
        ))
    }

    /// Build a session to `peer` from its bundle.
    pub fn start_session(&mut self, peer: &ProtocolAddress, bundle: &PreKeyBundle) -> Result<()> {
        SessionCipher::new(&self.store, peer.clone()).process_pre_key_bundle(bundle, &mut self.rng)
    }

    /// Whether a session to `peer` exists. Reads past the chaos layer.
    pub fn has_session(&self, peer: &ProtocolAddress) -> bool {
        self.oracle().contains_session(peer).unwrap_or(false)
    }

    /// Encrypt for `peer`, returning framed bytes.
    pub fn encrypt(&mut self, peer: &ProtocolAddress, plaintext: &[u8]) -> Result<Vec<u8>> {
        let message = SessionCipher::new(&self.store, peer.clone()).encrypt(plaintext)?;
        Ok(message.to_framed())
    }

    /// Our sender key for `group`, created on first use, as framed bytes.
    pub fn distribution(&mut self, group: &str) -> Result<Vec<u8>> {
        let name = SenderKeyName::new(group, self.address.clone());
        let message = GroupCipher::new(&self.store, name).create_session(&mut self.rng)?;
        Ok(CiphertextMessage::from(message).to_framed())
    }

    /// Encrypt for every member of `group`, returning framed bytes.
    pub fn group_encrypt(&mut self, group: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let name = SenderKeyName::new(group, self.address.clone());
        let message = GroupCipher::new(&self.store, name).encrypt(plaintext, &mut self.rng)?;
        Ok(CiphertextMessage::from(message).to_framed())
    }

    /// Handle framed bytes from `from`. Group traffic names its `group`.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` for a payload that does not fit the channel (group
    ///   kinds without a group, pairwise kinds with one)
    /// - Whatever the session or group cipher returns
    pub fn receive(
        &mut self,
        from: &ProtocolAddress,
        group: Option<&str>,
        payload: &[u8],
    ) -> Result<Received> {
        let message = CiphertextMessage::from_framed(payload)?;

        match (group, message) {
            (None, message @ (CiphertextMessage::PreKey(_) | CiphertextMessage::Signal(_))) => {
                let plaintext =
                    SessionCipher::new(&self.store, from.clone()).decrypt(&message, &mut self.rng)?;
                Ok(Received::Plaintext(plaintext))
            },
            (Some(group), CiphertextMessage::SenderKey(message)) => {
                let name = SenderKeyName::new(group, from.clone());
                Ok(Received::Plaintext(GroupCipher::new(&self.store, name).decrypt(&message)?))
            },
            (Some(group), CiphertextMessage::SenderKeyDistribution(message)) => {
                let name = SenderKeyName::new(group, from.clone());
                GroupCipher::new(&self.store, name).process(&message)?;
                Ok(Received::SenderKeyInstalled)
            },
            (group, message) => Err(SignalError::InvalidMessage {
                reason: format!(
                    "{:?} not accepted on {} channel",
                    message.message_type(),
                    if group.is_some() { "group" } else { "pairwise" }
                ),
            }),
        }
    }
}
