use axolotl_crypto::{aes_256_cbc_decrypt, aes_256_cbc_encrypt};
use axolotl_proto::{SenderKeyDistributionMessage, SenderKeyMessage};
use bytes::Bytes;
use rand::{CryptoRng, RngCore};

use super::state::{SenderKeyRecord, SenderKeyState};
use crate::{
    address::GroupAddress,
    error::{Result, SignalError},
    keys::{generate_sender_key, generate_sender_key_id, generate_sender_signing_key},
    storage::SenderKeyStore,
};

/// Encrypts and decrypts group messages for one sender key name.
///
/// Use the sender's own name to create a session and encrypt; use a
/// member's name to process their distribution message and decrypt.
pub struct GroupCipher<'a, N: GroupAddress, S: SenderKeyStore<N>> {
    store: &'a S,
    sender_key_name: N,
}

impl<'a, N: GroupAddress, S: SenderKeyStore<N>> GroupCipher<'a, N, S> {
    /// Bind a cipher to `sender_key_name`.
    pub fn new(store: &'a S, sender_key_name: N) -> Self {
        Self { store, sender_key_name }
    }

    /// Sender key name this cipher operates on.
    pub fn sender_key_name(&self) -> &N {
        &self.sender_key_name
    }

    /// Distribution message for our own sender key, creating the key on
    /// first use.
    ///
    /// The message describes the chain at its current iteration, so members
    /// who receive it cannot decrypt anything sent before.
    pub fn create_session<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<SenderKeyDistributionMessage> {
        let mut record = self.store.load_sender_key(&self.sender_key_name)?.unwrap_or_default();

        if record.is_empty() {
            let key_id = generate_sender_key_id(rng);
            let signing = generate_sender_signing_key(rng);
            record.set_sender_key_state(SenderKeyState::new(
                key_id,
                0,
                generate_sender_key(rng),
                signing.public_key,
                Some(signing.private_key),
            ));
            self.store.store_sender_key(&self.sender_key_name, &record)?;
            tracing::info!(name = %self.sender_key_name, key_id, "created sender key");
        }

        let Some(state) = record.sender_key_state() else {
            unreachable!("record holds a state after creation");
        };
        Ok(SenderKeyDistributionMessage::new(
            state.key_id(),
            state.chain_key().iteration(),
            *state.chain_key().seed(),
            *state.signing_key_public(),
        ))
    }

    /// Install a member's announced sender key.
    pub fn process(&self, distribution: &SenderKeyDistributionMessage) -> Result<()> {
        let mut record = self.store.load_sender_key(&self.sender_key_name)?.unwrap_or_default();
        record.add_sender_key_state(SenderKeyState::new(
            distribution.key_id(),
            distribution.iteration(),
            *distribution.chain_key(),
            *distribution.signing_key(),
            None,
        ));
        self.store.store_sender_key(&self.sender_key_name, &record)?;

        tracing::debug!(
            name = %self.sender_key_name,
            key_id = distribution.key_id(),
            iteration = distribution.iteration(),
            "processed sender key distribution"
        );
        Ok(())
    }

    /// Encrypt and sign a group message with our newest sender key.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no sender key exists for this name
    /// - `InvalidKey` if the state has no signing private key (it belongs to
    ///   another member)
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<SenderKeyMessage> {
        let mut record = self.load_record()?;
        let Some(state) = record.sender_key_state_mut() else {
            return Err(self.no_session());
        };
        let Some(signing_key) = state.signing_key_private().cloned() else {
            return Err(SignalError::InvalidKey {
                reason: format!("no signing private key for {}", self.sender_key_name),
            });
        };

        let chain_key = state.chain_key().clone();
        let message_key = chain_key.sender_message_key();
        let ciphertext =
            aes_256_cbc_encrypt(plaintext, message_key.cipher_key(), message_key.iv());
        let message = SenderKeyMessage::new(
            state.key_id(),
            chain_key.iteration(),
            Bytes::from(ciphertext),
            &signing_key,
            rng,
        );

        state.set_chain_key(chain_key.next()?);
        self.store.store_sender_key(&self.sender_key_name, &record)?;
        Ok(message)
    }

    /// Verify and decrypt a member's group message.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no sender key exists for this name
    /// - `InvalidSenderKeyId` if the message names a key we do not hold
    /// - `InvalidSignature` if the signature does not verify
    /// - `DuplicateMessage` / `InvalidMessage` from the chain bounds
    pub fn decrypt(&self, message: &SenderKeyMessage) -> Result<Vec<u8>> {
        let mut record = self.load_record()?;
        let Some(state) = record.sender_key_state_for_id_mut(message.key_id()) else {
            return Err(SignalError::InvalidSenderKeyId { key_id: message.key_id() });
        };

        if !message.verify_signature(state.signing_key_public())? {
            return Err(SignalError::InvalidSignature { context: "sender key message" });
        }

        let message_key = state.sender_message_key(message.iteration())?;
        let plaintext =
            aes_256_cbc_decrypt(message.ciphertext(), message_key.cipher_key(), message_key.iv())
                .map_err(|e| SignalError::InvalidMessage { reason: e.to_string() })?;

        self.store.store_sender_key(&self.sender_key_name, &record)?;
        Ok(plaintext)
    }

    fn load_record(&self) -> Result<SenderKeyRecord> {
        match self.store.load_sender_key(&self.sender_key_name)? {
            Some(record) if !record.is_empty() => Ok(record),
            _ => Err(self.no_session()),
        }
    }

    fn no_session(&self) -> SignalError {
        SignalError::NoSession { address: self.sender_key_name.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::KeyPair;
    use axolotl_proto::MessageVersion;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::{
        address::{ProtocolAddress, SenderKeyName},
        storage::MemoryStore,
    };

    fn name(sender: &str) -> SenderKeyName {
        SenderKeyName::new("group", ProtocolAddress::new(sender, 1))
    }

    fn store(rng: &mut ChaCha20Rng) -> MemoryStore {
        MemoryStore::new(KeyPair::generate(rng), 1)
    }

    #[test]
    fn create_session_is_idempotent() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let alice = store(&mut rng);
        let cipher = GroupCipher::new(&alice, name("alice"));

        let first = cipher.create_session(&mut rng).unwrap();
        let second = cipher.create_session(&mut rng).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.message_version(), MessageVersion::V3);
        assert!(first.key_id() < 1 << 31);
    }

    #[test]
    fn distribution_reflects_current_iteration() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let alice = store(&mut rng);
        let cipher = GroupCipher::new(&alice, name("alice"));

        cipher.create_session(&mut rng).unwrap();
        for _ in 0..3 {
            cipher.encrypt(b"hi", &mut rng).unwrap();
        }
        assert_eq!(cipher.create_session(&mut rng).unwrap().iteration(), 3);
    }

    #[test]
    fn encrypt_without_session() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let alice = store(&mut rng);
        let cipher = GroupCipher::new(&alice, name("alice"));

        assert!(matches!(cipher.encrypt(b"hi", &mut rng), Err(SignalError::NoSession { .. })));
    }

    #[test]
    fn receiver_cannot_encrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let alice = store(&mut rng);
        let bob = store(&mut rng);

        let distribution = GroupCipher::new(&alice, name("alice")).create_session(&mut rng).unwrap();
        let cipher = GroupCipher::new(&bob, name("alice"));
        cipher.process(&distribution).unwrap();

        assert!(matches!(cipher.encrypt(b"hi", &mut rng), Err(SignalError::InvalidKey { .. })));
    }

    #[test]
    fn failed_decrypt_leaves_record_untouched() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let alice = store(&mut rng);
        let bob = store(&mut rng);
        let sender = GroupCipher::new(&alice, name("alice"));
        let receiver = GroupCipher::new(&bob, name("alice"));

        receiver.process(&sender.create_session(&mut rng).unwrap()).unwrap();
        let before = bob.load_sender_key(&name("alice")).unwrap();

        let message = sender.encrypt(b"hello", &mut rng).unwrap();
        let mut bytes = message.serialized().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let forged = SenderKeyMessage::from_bytes(&bytes).unwrap();

        assert_eq!(
            receiver.decrypt(&forged).unwrap_err(),
            SignalError::InvalidSignature { context: "sender key message" }
        );
        assert_eq!(bob.load_sender_key(&name("alice")).unwrap(), before);
        assert_eq!(receiver.decrypt(&message).unwrap(), b"hello");
    }
}
