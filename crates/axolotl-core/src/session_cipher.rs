//! Pairwise encryption over a stored session
//!
//! Every call loads the record for the remote address, works on that copy,
//! and stores it back only when the whole operation succeeded. A message
//! that fails to decrypt (bad MAC, duplicate, too far ahead) leaves the
//! stored record byte-for-byte unchanged.

use axolotl_crypto::{aes_256_cbc_decrypt, aes_256_cbc_encrypt};
use axolotl_proto::{
    CiphertextMessage, MacContext, MessageVersion, PreKeySignalMessage, SignalMessage,
};
use bytes::Bytes;
use rand::{CryptoRng, RngCore};

use crate::{
    address::Address,
    error::{Result, SignalError},
    session_builder::SessionBuilder,
    state::{PreKeyBundle, SessionRecord, SessionState},
    storage::ProtocolStore,
};

/// Encrypts to and decrypts from one remote device.
pub struct SessionCipher<'a, A: Address, S: ProtocolStore<A>> {
    store: &'a S,
    remote_address: A,
}

impl<'a, A: Address, S: ProtocolStore<A>> SessionCipher<'a, A, S> {
    /// Bind a cipher to `remote_address`.
    pub fn new(store: &'a S, remote_address: A) -> Self {
        Self { store, remote_address }
    }

    /// Remote device this cipher talks to.
    pub fn remote_address(&self) -> &A {
        &self.remote_address
    }

    /// Build a session from the remote device's prekey bundle.
    ///
    /// See [`SessionBuilder::process_pre_key_bundle`].
    pub fn process_pre_key_bundle<R: RngCore + CryptoRng>(
        &self,
        bundle: &PreKeyBundle,
        rng: &mut R,
    ) -> Result<()> {
        SessionBuilder::new(self.store, &self.remote_address).process_pre_key_bundle(bundle, rng)
    }

    /// Encrypt `plaintext` on the current session state.
    ///
    /// Returns a [`PreKeySignalMessage`] until the remote device has
    /// answered, a [`SignalMessage`] afterwards.
    ///
    /// # Errors
    ///
    /// - `NoSession` if there is no current state
    /// - `Storage` on store failure
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CiphertextMessage> {
        let mut record = self.load_record()?;
        let Some(state) = record.session_state_mut() else {
            return Err(self.no_session());
        };

        let chain_key = state.sender_chain().chain_key().clone();
        let message_keys = chain_key.message_keys();
        let ciphertext =
            aes_256_cbc_encrypt(plaintext, message_keys.cipher_key(), message_keys.iv());

        let mac = MacContext {
            sender_identity: state.local_identity(),
            receiver_identity: state.remote_identity(),
            mac_key: message_keys.mac_key(),
        };
        let version = state.session_version();
        let signal = SignalMessage::new(
            version,
            state.sender_chain().ratchet_key().public_key,
            chain_key.index(),
            state.previous_counter(),
            Bytes::from(ciphertext),
            &mac,
        );

        let message = match state.pending_pre_key() {
            Some(pending) => CiphertextMessage::PreKey(PreKeySignalMessage::new(
                version,
                state.local_registration_id(),
                pending.pre_key_id(),
                pending.signed_pre_key_id(),
                *pending.base_key(),
                *state.local_identity(),
                signal,
            )),
            None => CiphertextMessage::Signal(signal),
        };

        state.set_sender_chain_key(chain_key.next()?);
        self.store.store_session(&self.remote_address, &record)?;

        tracing::trace!(
            remote = %self.remote_address,
            counter = chain_key.index(),
            kind = ?message.message_type(),
            "encrypted message"
        );
        Ok(message)
    }

    /// Decrypt any pairwise message.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` for group message kinds
    /// - See [`decrypt_pre_key_message`](Self::decrypt_pre_key_message) and
    ///   [`decrypt_signal_message`](Self::decrypt_signal_message)
    pub fn decrypt<R: RngCore + CryptoRng>(
        &self,
        message: &CiphertextMessage,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        match message {
            CiphertextMessage::PreKey(message) => self.decrypt_pre_key_message(message, rng),
            CiphertextMessage::Signal(message) => self.decrypt_signal_message(message, rng),
            other => Err(SignalError::InvalidMessage {
                reason: format!("{:?} is not a pairwise message", other.message_type()),
            }),
        }
    }

    /// Run the responder handshake if needed, then decrypt the inner
    /// message. On success the remote identity is recorded and a consumed
    /// one-time prekey is removed from the store. Once the session is
    /// stored the plaintext is returned; a failed prekey removal is only
    /// logged.
    ///
    /// # Errors
    ///
    /// - `UntrustedIdentity` if the sender's identity changed
    /// - `InvalidKeyId` if a referenced prekey is missing
    /// - Everything [`decrypt_signal_message`](Self::decrypt_signal_message)
    ///   returns
    pub fn decrypt_pre_key_message<R: RngCore + CryptoRng>(
        &self,
        message: &PreKeySignalMessage,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut record =
            self.store.load_session(&self.remote_address)?.unwrap_or_else(SessionRecord::new_fresh);

        let processed = SessionBuilder::new(self.store, &self.remote_address)
            .process_pre_key_message(&mut record, message)?;
        let plaintext = self.decrypt_with_record(&mut record, message.message(), rng)?;

        // The session write commits the decrypt; nothing after it may fail.
        self.store.save_identity(&self.remote_address, message.identity_key())?;
        self.store.store_session(&self.remote_address, &record)?;

        if let Some(id) = processed.used_pre_key_id {
            match self.store.remove_pre_key(id) {
                Ok(()) => tracing::debug!(
                    remote = %self.remote_address,
                    pre_key_id = id,
                    "removed used pre key"
                ),
                Err(err) => tracing::warn!(
                    remote = %self.remote_address,
                    pre_key_id = id,
                    error = %err,
                    "failed to remove used pre key"
                ),
            }
        }
        Ok(plaintext)
    }

    /// Decrypt a message on an established session.
    ///
    /// # Errors
    ///
    /// - `NoSession` if no record exists
    /// - `DuplicateMessage` if the message key was already used
    /// - `InvalidMessage` if the message is too far ahead, uses another
    ///   version than the session, or fails to decrypt
    /// - `InvalidMac` if no state authenticates the message
    pub fn decrypt_signal_message<R: RngCore + CryptoRng>(
        &self,
        message: &SignalMessage,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut record = self.load_record()?;
        let plaintext = self.decrypt_with_record(&mut record, message, rng)?;
        self.store.store_session(&self.remote_address, &record)?;
        Ok(plaintext)
    }

    /// The peer's registration id from the current state.
    ///
    /// # Errors
    ///
    /// - `NoSession` if there is no current state
    pub fn remote_registration_id(&self) -> Result<Option<u32>> {
        let record = self.load_record()?;
        let state = record.session_state().ok_or_else(|| self.no_session())?;
        Ok(state.remote_registration_id())
    }

    /// Version of the current state.
    ///
    /// # Errors
    ///
    /// - `NoSession` if there is no current state
    pub fn session_version(&self) -> Result<MessageVersion> {
        let record = self.load_record()?;
        let state = record.session_state().ok_or_else(|| self.no_session())?;
        Ok(state.session_version())
    }

    /// Try the current state, then each archived state, most recent first.
    /// The first state that decrypts replaces its original in `record`; an
    /// archived state is promoted to current.
    ///
    /// If no state decrypts, the current state's error is returned.
    fn decrypt_with_record<R: RngCore + CryptoRng>(
        &self,
        record: &mut SessionRecord,
        message: &SignalMessage,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut first_error = None;

        if let Some(mut state) = record.session_state().cloned() {
            match decrypt_with_state(&mut state, message, rng) {
                Ok(plaintext) => {
                    if let Some(current) = record.session_state_mut() {
                        *current = state;
                    }
                    return Ok(plaintext);
                },
                Err(err @ SignalError::DuplicateMessage { .. }) => return Err(err),
                Err(err) if is_state_mismatch(&err) => first_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        let archived: Vec<SessionState> = record.previous_session_states().cloned().collect();
        for (index, mut state) in archived.into_iter().enumerate() {
            match decrypt_with_state(&mut state, message, rng) {
                Ok(plaintext) => {
                    tracing::info!(
                        remote = %self.remote_address,
                        index,
                        "decrypted with archived session, promoting"
                    );
                    record.promote_old_session(index, state);
                    return Ok(plaintext);
                },
                Err(err @ SignalError::DuplicateMessage { .. }) => return Err(err),
                Err(err) if is_state_mismatch(&err) => {
                    first_error.get_or_insert(err);
                },
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(remote = %self.remote_address, "no session state decrypted message");
        Err(first_error.unwrap_or_else(|| self.no_session()))
    }

    fn load_record(&self) -> Result<SessionRecord> {
        self.store.load_session(&self.remote_address)?.ok_or_else(|| self.no_session())
    }

    fn no_session(&self) -> SignalError {
        SignalError::NoSession { address: self.remote_address.to_string() }
    }
}

/// Errors that mean "wrong state for this message" rather than "bad
/// message"; the next archived state may still succeed.
fn is_state_mismatch(err: &SignalError) -> bool {
    matches!(err, SignalError::InvalidMac | SignalError::InvalidMessage { .. } | SignalError::Crypto(_))
}

fn decrypt_with_state<R: RngCore + CryptoRng>(
    state: &mut SessionState,
    message: &SignalMessage,
    rng: &mut R,
) -> Result<Vec<u8>> {
    if message.message_version() != state.session_version() {
        return Err(SignalError::InvalidMessage {
            reason: format!(
                "message version {} does not match session version {}",
                message.message_version().as_u8(),
                state.session_version().as_u8()
            ),
        });
    }

    let message_keys = state.message_keys(message.sender_ratchet_key(), message.counter(), rng)?;

    let mac = MacContext {
        sender_identity: state.remote_identity(),
        receiver_identity: state.local_identity(),
        mac_key: message_keys.mac_key(),
    };
    if !message.verify_mac(&mac) {
        tracing::debug!(counter = message.counter(), "rejected message with bad MAC");
        return Err(SignalError::InvalidMac);
    }

    let plaintext = aes_256_cbc_decrypt(message.body(), message_keys.cipher_key(), message_keys.iv())
        .map_err(|e| SignalError::InvalidMessage { reason: e.to_string() })?;

    state.clear_pending_pre_key();
    Ok(plaintext)
}
