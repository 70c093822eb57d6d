//! One ratchet session with one remote device
//!
//! A `SessionState` owns the root key, our sending chain, a bounded set of
//! receiving chains and the handshake data still owed to the peer. The
//! receive path lives here because it is pure state manipulation:
//!
//! ```text
//! incoming (ratchet_key, counter)
//!     │
//!     ├─ unknown ratchet_key → DH step: new receiver chain, new sender chain
//!     │
//!     ├─ counter < chain index → take skipped key, or DuplicateMessage
//!     ├─ counter - index > MAX_FORWARD_JUMPS → InvalidMessage
//!     └─ otherwise → cache keys up to counter, advance chain
//! ```
//!
//! # Invariants
//!
//! - At most [`MAX_RECEIVER_CHAINS`] receiver chains; the oldest goes first.
//! - Every message key is returned at most once.

use std::collections::VecDeque;

use axolotl_crypto::{ChainKey, KeyPair, MessageKeys, PublicKey, RootKey};
use axolotl_proto::MessageVersion;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::chain::{ReceiverChain, SenderChain};
use crate::{
    consts::{MAX_FORWARD_JUMPS, MAX_RECEIVER_CHAINS},
    error::{Result, SignalError},
};

/// Handshake data the initiator repeats until the responder answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
}

impl PendingPreKey {
    /// Record which prekeys and base key the handshake used.
    pub fn new(pre_key_id: Option<u32>, signed_pre_key_id: u32, base_key: PublicKey) -> Self {
        Self { pre_key_id, signed_pre_key_id, base_key }
    }

    /// One-time prekey consumed, if any.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Signed prekey used.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Initiator base key.
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }
}

/// Ratchet state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    session_version: MessageVersion,
    local_identity: PublicKey,
    remote_identity: PublicKey,
    root_key: RootKey,
    previous_counter: u32,
    sender_chain: SenderChain,
    receiver_chains: VecDeque<ReceiverChain>,
    pending_pre_key: Option<PendingPreKey>,
    local_registration_id: u32,
    remote_registration_id: Option<u32>,
    alice_base_key: PublicKey,
}

impl SessionState {
    /// Create a state straight out of a handshake.
    pub fn new(
        session_version: MessageVersion,
        local_identity: PublicKey,
        remote_identity: PublicKey,
        root_key: RootKey,
        sender_chain: SenderChain,
        alice_base_key: PublicKey,
    ) -> Self {
        Self {
            session_version,
            local_identity,
            remote_identity,
            root_key,
            previous_counter: 0,
            sender_chain,
            receiver_chains: VecDeque::new(),
            pending_pre_key: None,
            local_registration_id: 0,
            remote_registration_id: None,
            alice_base_key,
        }
    }

    /// Version negotiated for this session.
    pub fn session_version(&self) -> MessageVersion {
        self.session_version
    }

    /// Our identity key.
    pub fn local_identity(&self) -> &PublicKey {
        &self.local_identity
    }

    /// The remote party's identity key.
    pub fn remote_identity(&self) -> &PublicKey {
        &self.remote_identity
    }

    /// Current root key.
    pub fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    /// Length of our previous sending chain, as advertised to the peer.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// Our sending chain.
    pub fn sender_chain(&self) -> &SenderChain {
        &self.sender_chain
    }

    /// Receiver chains, oldest first.
    pub fn receiver_chains(&self) -> impl Iterator<Item = &ReceiverChain> {
        self.receiver_chains.iter()
    }

    /// Receiver chain opened by `ratchet_key`, if we have one.
    pub fn receiver_chain(&self, ratchet_key: &PublicKey) -> Option<&ReceiverChain> {
        self.receiver_chains.iter().find(|chain| chain.ratchet_key() == ratchet_key)
    }

    /// Handshake data still owed to the responder.
    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    /// Our registration id, as sent in prekey messages.
    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    /// The peer's registration id, once known.
    pub fn remote_registration_id(&self) -> Option<u32> {
        self.remote_registration_id
    }

    /// Base key of the handshake that created this state. Identifies the
    /// session across archive and promotion.
    pub fn alice_base_key(&self) -> &PublicKey {
        &self.alice_base_key
    }

    pub(crate) fn set_pending_pre_key(&mut self, pending: PendingPreKey) {
        self.pending_pre_key = Some(pending);
    }

    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    pub(crate) fn set_local_registration_id(&mut self, id: u32) {
        self.local_registration_id = id;
    }

    pub(crate) fn set_remote_registration_id(&mut self, id: u32) {
        self.remote_registration_id = Some(id);
    }

    pub(crate) fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain.set_chain_key(chain_key);
    }

    /// Append a receiver chain, evicting the oldest beyond the bound.
    pub(crate) fn add_receiver_chain(&mut self, ratchet_key: PublicKey, chain_key: ChainKey) {
        self.receiver_chains.push_back(ReceiverChain::new(ratchet_key, chain_key));
        while self.receiver_chains.len() > MAX_RECEIVER_CHAINS {
            if let Some(evicted) = self.receiver_chains.pop_front() {
                tracing::debug!(
                    chain_index = evicted.chain_key().index(),
                    skipped = evicted.skipped_len(),
                    "evicted receiver chain"
                );
            }
        }
    }

    fn receiver_chain_mut(&mut self, ratchet_key: &PublicKey) -> Option<&mut ReceiverChain> {
        self.receiver_chains.iter_mut().find(|chain| chain.ratchet_key() == ratchet_key)
    }

    /// Message keys for `counter` on the chain opened by `their_ratchet_key`.
    ///
    /// Performs a DH ratchet step if the ratchet key is new. Intermediate
    /// keys are cached for out-of-order delivery.
    ///
    /// # Errors
    ///
    /// - `DuplicateMessage` if `counter` is behind the chain and not cached
    /// - `InvalidMessage` if `counter` is more than [`MAX_FORWARD_JUMPS`] ahead
    /// - `Crypto` if the ratchet key yields a degenerate agreement
    pub(crate) fn message_keys<R: RngCore + CryptoRng>(
        &mut self,
        their_ratchet_key: &PublicKey,
        counter: u32,
        rng: &mut R,
    ) -> Result<MessageKeys> {
        if self.receiver_chain(their_ratchet_key).is_none() {
            self.ratchet_step(their_ratchet_key, rng)?;
        }
        let Some(chain) = self.receiver_chain_mut(their_ratchet_key) else {
            unreachable!("receiver chain exists after ratchet step");
        };

        let chain_index = chain.chain_key().index();
        if counter < chain_index {
            return chain.take_message_keys(counter).ok_or_else(|| {
                tracing::debug!(chain_index, counter, "rejected duplicate message");
                SignalError::DuplicateMessage { chain_index, counter }
            });
        }

        let jump = counter - chain_index;
        if jump > MAX_FORWARD_JUMPS {
            tracing::warn!(chain_index, counter, "rejected message too far in the future");
            return Err(SignalError::InvalidMessage {
                reason: format!("counter {counter} is {jump} ahead of chain index {chain_index}"),
            });
        }

        let mut chain_key = chain.chain_key().clone();
        while chain_key.index() < counter {
            chain.push_message_keys(chain_key.message_keys());
            chain_key = chain_key.next()?;
        }

        let keys = chain_key.message_keys();
        chain.set_chain_key(chain_key.next()?);
        Ok(keys)
    }

    /// DH ratchet step on a new remote ratchet key.
    ///
    /// # Invariants
    ///
    /// - Post: a receiver chain for `their_ratchet_key` exists.
    /// - Post: the sender chain uses a fresh key pair starting at index 0.
    /// - Post: `previous_counter` is the length of the replaced sender chain.
    fn ratchet_step<R: RngCore + CryptoRng>(
        &mut self,
        their_ratchet_key: &PublicKey,
        rng: &mut R,
    ) -> Result<()> {
        let (receiver_root, receiver_chain) = self
            .root_key
            .create_chain(their_ratchet_key, &self.sender_chain.ratchet_key().private_key)?;

        let ratchet_key = KeyPair::generate(rng);
        let (sender_root, sender_chain) =
            receiver_root.create_chain(their_ratchet_key, &ratchet_key.private_key)?;

        let previous_counter = self.sender_chain.chain_key().index().max(1) - 1;
        tracing::debug!(
            their_ratchet_key = ?their_ratchet_key,
            previous_counter,
            "DH ratchet step"
        );

        self.root_key = sender_root;
        self.add_receiver_chain(*their_ratchet_key, receiver_chain);
        self.previous_counter = previous_counter;
        self.sender_chain = SenderChain::new(ratchet_key, sender_chain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::initial_keys;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    /// Two states wired to each other as if a handshake had run: `alice`
    /// sends on a chain `bob` can open with one ratchet step.
    fn pair(rng: &mut ChaCha20Rng) -> (SessionState, SessionState) {
        let alice_identity = KeyPair::generate(rng).public_key;
        let bob_identity = KeyPair::generate(rng).public_key;
        let bob_ratchet = KeyPair::generate(rng);
        let alice_ratchet = KeyPair::generate(rng);
        let (root, chain) = initial_keys(&[0x42; 128]);

        let (alice_root, alice_chain) =
            root.create_chain(&bob_ratchet.public_key, &alice_ratchet.private_key).unwrap();
        let base = alice_ratchet.public_key;

        let mut alice = SessionState::new(
            MessageVersion::V3,
            alice_identity,
            bob_identity,
            alice_root,
            SenderChain::new(alice_ratchet, alice_chain),
            base,
        );
        alice.add_receiver_chain(bob_ratchet.public_key, chain.clone());

        let bob = SessionState::new(
            MessageVersion::V3,
            bob_identity,
            alice_identity,
            root,
            SenderChain::new(bob_ratchet, chain),
            base,
        );
        (alice, bob)
    }

    fn send(state: &mut SessionState) -> (PublicKey, MessageKeys) {
        let chain_key = state.sender_chain().chain_key().clone();
        state.set_sender_chain_key(chain_key.next().unwrap());
        (state.sender_chain().ratchet_key().public_key, chain_key.message_keys())
    }

    #[test]
    fn receiver_derives_sender_keys() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (mut alice, mut bob) = pair(&mut rng);

        let (ratchet, sent) = send(&mut alice);
        let received = bob.message_keys(&ratchet, 0, &mut rng).unwrap();

        assert_eq!(sent, received);
        assert_eq!(bob.receiver_chains().count(), 1);
        assert_eq!(bob.sender_chain().chain_key().index(), 0);
    }

    #[test]
    fn skipped_keys_served_once() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let (mut alice, mut bob) = pair(&mut rng);

        let sent: Vec<_> = (0..3).map(|_| send(&mut alice)).collect();
        let ratchet = sent[0].0;

        assert_eq!(bob.message_keys(&ratchet, 2, &mut rng).unwrap(), sent[2].1);
        assert_eq!(bob.message_keys(&ratchet, 0, &mut rng).unwrap(), sent[0].1);
        assert_eq!(
            bob.message_keys(&ratchet, 0, &mut rng).unwrap_err(),
            SignalError::DuplicateMessage { chain_index: 3, counter: 0 }
        );
        assert_eq!(bob.message_keys(&ratchet, 1, &mut rng).unwrap(), sent[1].1);
    }

    #[test]
    fn forward_jump_is_bounded() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (mut alice, mut bob) = pair(&mut rng);
        let (ratchet, _) = send(&mut alice);

        let err = bob.message_keys(&ratchet, MAX_FORWARD_JUMPS + 1, &mut rng).unwrap_err();
        assert!(matches!(err, SignalError::InvalidMessage { .. }));

        assert!(bob.message_keys(&ratchet, MAX_FORWARD_JUMPS, &mut rng).is_ok());
    }

    #[test]
    fn ratchet_step_records_previous_counter() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (mut alice, mut bob) = pair(&mut rng);

        let (ratchet, _) = send(&mut alice);
        bob.message_keys(&ratchet, 0, &mut rng).unwrap();
        for _ in 0..3 {
            send(&mut bob);
        }
        let (bob_ratchet, bob_keys) = send(&mut bob);

        assert_eq!(alice.message_keys(&bob_ratchet, 3, &mut rng).unwrap(), bob_keys);
        assert_eq!(alice.previous_counter(), 0);

        let (ratchet, _) = send(&mut alice);
        bob.message_keys(&ratchet, 0, &mut rng).unwrap();
        assert_eq!(bob.previous_counter(), 3);
    }

    #[test]
    fn receiver_chains_are_bounded() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (_, mut bob) = pair(&mut rng);

        let keys: Vec<_> = (0..MAX_RECEIVER_CHAINS + 2)
            .map(|i| {
                let key = KeyPair::generate(&mut rng).public_key;
                bob.add_receiver_chain(key, ChainKey::new([i as u8; 32], 0));
                key
            })
            .collect();

        assert_eq!(bob.receiver_chains().count(), MAX_RECEIVER_CHAINS);
        assert!(bob.receiver_chain(&keys[0]).is_none());
        assert!(bob.receiver_chain(&keys[1]).is_none());
        assert!(bob.receiver_chain(&keys[MAX_RECEIVER_CHAINS + 1]).is_some());
    }
}
