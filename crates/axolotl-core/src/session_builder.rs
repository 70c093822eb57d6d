//! Handshake: turning prekey material into a session state
//!
//! ```text
//! initiator (Alice)                         responder (Bob)
//!   bundle ──► verify SPK signature
//!              base key B, ratchet key R
//!              DH1 = DH(IK_a, SPK_b)           DH1 = DH(SPK_b, IK_a)
//!              DH2 = DH(B,    IK_b)            DH2 = DH(IK_b,  B)
//!              DH3 = DH(B,    SPK_b)           DH3 = DH(SPK_b, B)
//!            [ DH4 = DH(B,    OPK_b) ]       [ DH4 = DH(OPK_b, B) ]
//!   (root, chain) = HKDF(0xFF*32 ‖ DH1 ‖ DH2 ‖ DH3 [‖ DH4])
//!   receiver chain (SPK_b, chain)             sender chain (SPK_b, chain)
//!   sender chain = root.create_chain(SPK_b, R)
//! ```
//!
//! The initiator keeps sending `PreKeySignalMessage`s until the responder
//! answers. The responder's first reply carries a fresh ratchet key, which
//! triggers the first DH ratchet step on the initiator side.

use axolotl_crypto::{DISCONTINUITY_LENGTH, KeyPair, PublicKey, initial_keys};
use axolotl_proto::{MessageVersion, PreKeySignalMessage};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{
    address::Address,
    error::{Result, SignalError},
    state::{PendingPreKey, PreKeyBundle, SenderChain, SessionRecord, SessionState},
    storage::ProtocolStore,
};

/// Builds sessions with one remote device.
pub struct SessionBuilder<'a, A: Address, S: ProtocolStore<A>> {
    store: &'a S,
    remote_address: &'a A,
}

/// What the responder learned from a prekey message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcessedPreKey {
    /// One-time prekey to delete once the message decrypts
    pub(crate) used_pre_key_id: Option<u32>,
}

impl<'a, A: Address, S: ProtocolStore<A>> SessionBuilder<'a, A, S> {
    /// Bind a builder to `remote_address`.
    pub fn new(store: &'a S, remote_address: &'a A) -> Self {
        Self { store, remote_address }
    }

    /// Initiator path: build a session from the remote device's bundle and
    /// store it as the current state.
    ///
    /// # Errors
    ///
    /// - `UntrustedIdentity` if the bundle's identity differs from the one
    ///   on record
    /// - `InvalidSignature` if the signed prekey signature does not verify
    /// - `Storage` on store failure
    pub fn process_pre_key_bundle<R: RngCore + CryptoRng>(
        &self,
        bundle: &PreKeyBundle,
        rng: &mut R,
    ) -> Result<()> {
        let their_identity = bundle.identity_key();
        self.check_trusted(their_identity)?;

        let signature_ok = their_identity.verify_signature(
            &bundle.signed_pre_key_public().to_bytes(),
            bundle.signed_pre_key_signature(),
        );
        if !matches!(signature_ok, Ok(true)) {
            return Err(SignalError::InvalidSignature { context: "signed pre key" });
        }

        let our_identity = self.store.identity_key_pair()?;
        let base_key = KeyPair::generate(rng);
        let ratchet_key = KeyPair::generate(rng);
        let their_signed_pre_key = bundle.signed_pre_key_public();

        let mut secrets = master_secret_prefix();
        secrets.extend_from_slice(&our_identity.calculate_agreement(their_signed_pre_key)?);
        secrets.extend_from_slice(&base_key.calculate_agreement(their_identity)?);
        secrets.extend_from_slice(&base_key.calculate_agreement(their_signed_pre_key)?);
        if let Some(their_pre_key) = bundle.pre_key_public() {
            secrets.extend_from_slice(&base_key.calculate_agreement(their_pre_key)?);
        }
        let (root_key, chain_key) = initial_keys(&secrets);
        secrets.zeroize();

        let (sending_root, sending_chain) =
            root_key.create_chain(their_signed_pre_key, &ratchet_key.private_key)?;

        let mut state = SessionState::new(
            MessageVersion::CURRENT,
            our_identity.public_key,
            *their_identity,
            sending_root,
            SenderChain::new(ratchet_key, sending_chain),
            base_key.public_key,
        );
        state.add_receiver_chain(*their_signed_pre_key, chain_key);
        state.set_pending_pre_key(PendingPreKey::new(
            bundle.pre_key_id(),
            bundle.signed_pre_key_id(),
            base_key.public_key,
        ));
        state.set_local_registration_id(self.store.local_registration_id()?);
        state.set_remote_registration_id(bundle.registration_id());

        let mut record = self.store.load_session(self.remote_address)?.unwrap_or_default();
        record.promote_state(state);
        self.store.store_session(self.remote_address, &record)?;
        self.store.save_identity(self.remote_address, their_identity)?;

        tracing::info!(
            remote = %self.remote_address,
            pre_key_id = ?bundle.pre_key_id(),
            signed_pre_key_id = bundle.signed_pre_key_id(),
            "built session from pre key bundle"
        );
        Ok(())
    }

    /// Responder path: promote a new state built from `message` into
    /// `record`. Nothing is persisted; the caller stores the record once the
    /// inner message decrypts.
    ///
    /// A message whose base key already produced a state in `record` is a
    /// retransmission and leaves `record` as is.
    ///
    /// # Errors
    ///
    /// - `UntrustedIdentity` if the message's identity differs from the one
    ///   on record
    /// - `InvalidKeyId` if a referenced prekey is not in the store
    pub(crate) fn process_pre_key_message(
        &self,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<ProcessedPreKey> {
        let their_identity = message.identity_key();
        self.check_trusted(their_identity)?;

        let version = message.message_version();
        if record.has_session_state(version, message.base_key()) {
            tracing::debug!(remote = %self.remote_address, "pre key message for existing session");
            return Ok(ProcessedPreKey { used_pre_key_id: None });
        }

        let signed_pre_key_id = message.signed_pre_key_id();
        let Some(signed_pre_key) = self.store.load_signed_pre_key(signed_pre_key_id)? else {
            return Err(SignalError::InvalidKeyId { kind: "signed pre key", id: signed_pre_key_id });
        };
        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => match self.store.load_pre_key(id)? {
                Some(record) => Some(record),
                None => return Err(SignalError::InvalidKeyId { kind: "pre key", id }),
            },
            None => None,
        };

        let our_identity = self.store.identity_key_pair()?;
        let our_signed_pre_key = signed_pre_key.key_pair();
        let their_base_key = message.base_key();

        let mut secrets = master_secret_prefix();
        secrets.extend_from_slice(&our_signed_pre_key.calculate_agreement(their_identity)?);
        secrets.extend_from_slice(&our_identity.calculate_agreement(their_base_key)?);
        secrets.extend_from_slice(&our_signed_pre_key.calculate_agreement(their_base_key)?);
        if let Some(pre_key) = &one_time_pre_key {
            secrets.extend_from_slice(&pre_key.key_pair().calculate_agreement(their_base_key)?);
        }
        let (root_key, chain_key) = initial_keys(&secrets);
        secrets.zeroize();

        let mut state = SessionState::new(
            version,
            our_identity.public_key,
            *their_identity,
            root_key,
            SenderChain::new(our_signed_pre_key.clone(), chain_key),
            *their_base_key,
        );
        state.set_local_registration_id(self.store.local_registration_id()?);
        state.set_remote_registration_id(message.registration_id());
        record.promote_state(state);

        tracing::info!(
            remote = %self.remote_address,
            pre_key_id = ?message.pre_key_id(),
            signed_pre_key_id,
            version = version.as_u8(),
            "built session from pre key message"
        );
        Ok(ProcessedPreKey { used_pre_key_id: one_time_pre_key.map(|record| record.id()) })
    }

    fn check_trusted(&self, identity: &PublicKey) -> Result<()> {
        if self.store.is_trusted_identity(self.remote_address, identity)? {
            Ok(())
        } else {
            tracing::warn!(remote = %self.remote_address, "untrusted identity");
            Err(SignalError::UntrustedIdentity { address: self.remote_address.to_string() })
        }
    }
}

fn master_secret_prefix() -> Vec<u8> {
    let mut secrets = Vec::with_capacity(DISCONTINUITY_LENGTH + 4 * 32);
    secrets.extend_from_slice(&[0xFF; DISCONTINUITY_LENGTH]);
    secrets
}
