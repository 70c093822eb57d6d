//! Fuzz target for pairwise sessions under an adversarial network
//!
//! Alice builds a session from Bob's bundle, then the fuzzer chooses who
//! sends, which in-flight message arrives next, which delivered message is
//! replayed and which byte of a message is flipped on the way.
//!
//! # Invariants
//!
//! - Nothing panics
//! - A message decrypts at most once, and only to what was encrypted
//! - A replayed message never decrypts
//! - After the schedule, fresh messages still decrypt in both directions

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use axolotl_core::{
    MemoryStore, PreKeyBundle, ProtocolAddress, SessionCipher, keys,
    storage::{IdentityKeyStore, SessionStore},
};
use axolotl_proto::CiphertextMessage;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const MAX_OPERATIONS: usize = 256;

#[derive(Debug, Clone, Arbitrary)]
struct SessionScenario {
    seed: u64,
    /// Whether Bob's bundle carries a one-time prekey
    one_time_pre_key: bool,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    /// Encrypt a message of `len` bytes
    Send { from_alice: bool, len: u8 },
    /// Deliver the in-flight message at `index`
    Deliver { index: u8 },
    /// Deliver a copy of an already delivered message again
    Replay { index: u8 },
    /// Deliver a copy of an in-flight message with one byte flipped
    Corrupt { index: u8, position: u16, flip: u8 },
}

struct InFlight {
    id: usize,
    to_bob: bool,
    framed: Vec<u8>,
    plaintext: Vec<u8>,
}

struct Peer {
    store: MemoryStore,
    address: ProtocolAddress,
}

fn deliver(
    receiver: &Peer,
    sender: &Peer,
    framed: &[u8],
    rng: &mut ChaCha20Rng,
) -> Option<Vec<u8>> {
    let message = CiphertextMessage::from_framed(framed).ok()?;
    SessionCipher::new(&receiver.store, sender.address.clone()).decrypt(&message, rng).ok()
}

fuzz_target!(|scenario: SessionScenario| {
    let mut rng = ChaCha20Rng::seed_from_u64(scenario.seed);
    let peer = |name: &str, rng: &mut ChaCha20Rng| Peer {
        store: MemoryStore::new(
            keys::generate_identity_key_pair(rng),
            keys::generate_registration_id(rng),
        ),
        address: ProtocolAddress::new(name, 1),
    };
    let alice = peer("alice", &mut rng);
    let bob = peer("bob", &mut rng);

    let bob_identity = IdentityKeyStore::<ProtocolAddress>::identity_key_pair(&bob.store)
        .expect("memory store holds an identity");
    let signed = keys::rotate_signed_pre_key(&bob.store, &bob_identity, &mut rng, 0)
        .expect("memory store accepts signed prekeys");
    let pre_key = if scenario.one_time_pre_key {
        keys::create_pre_keys(&bob.store, &mut rng, 1).expect("memory store accepts prekeys").pop()
    } else {
        None
    };
    let bundle = PreKeyBundle::new(
        7,
        1,
        pre_key.map(|record| (record.id(), record.key_pair().public_key)),
        signed.id(),
        signed.key_pair().public_key,
        signed.signature().to_vec(),
        bob_identity.public_key,
    );
    SessionCipher::new(&alice.store, bob.address.clone())
        .process_pre_key_bundle(&bundle, &mut rng)
        .expect("fresh bundle is valid");

    let mut in_flight: Vec<InFlight> = Vec::new();
    let mut delivered: Vec<InFlight> = Vec::new();
    let mut decrypted = HashSet::new();
    let mut next_id = 0;

    for operation in scenario.operations.into_iter().take(MAX_OPERATIONS) {
        match operation {
            Operation::Send { from_alice, len } => {
                let (sender, receiver) = if from_alice { (&alice, &bob) } else { (&bob, &alice) };
                if !sender.store.contains_session(&receiver.address).unwrap_or(false) {
                    continue;
                }
                let mut plaintext = format!("{next_id}:").into_bytes();
                plaintext.resize(plaintext.len() + usize::from(len), 0xAB);
                let message = SessionCipher::new(&sender.store, receiver.address.clone())
                    .encrypt(&plaintext)
                    .expect("encrypt on an existing session");
                in_flight.push(InFlight {
                    id: next_id,
                    to_bob: from_alice,
                    framed: message.to_framed(),
                    plaintext,
                });
                next_id += 1;
            },

            Operation::Deliver { index } => {
                if in_flight.is_empty() {
                    continue;
                }
                let message = in_flight.remove(usize::from(index) % in_flight.len());
                let (receiver, sender) =
                    if message.to_bob { (&bob, &alice) } else { (&alice, &bob) };
                if let Some(plaintext) = deliver(receiver, sender, &message.framed, &mut rng) {
                    assert_eq!(plaintext, message.plaintext, "wrong plaintext");
                    assert!(decrypted.insert(message.id), "message {} decrypted twice", message.id);
                }
                delivered.push(message);
            },

            Operation::Replay { index } => {
                if delivered.is_empty() {
                    continue;
                }
                let message = &delivered[usize::from(index) % delivered.len()];
                if !decrypted.contains(&message.id) {
                    continue;
                }
                let (receiver, sender) =
                    if message.to_bob { (&bob, &alice) } else { (&alice, &bob) };
                assert!(
                    deliver(receiver, sender, &message.framed, &mut rng).is_none(),
                    "replay of message {} decrypted",
                    message.id
                );
            },

            Operation::Corrupt { index, position, flip } => {
                if in_flight.is_empty() || flip == 0 {
                    continue;
                }
                let message = &in_flight[usize::from(index) % in_flight.len()];
                let mut framed = message.framed.clone();
                let position = usize::from(position) % framed.len();
                framed[position] ^= flip;

                let (receiver, sender) =
                    if message.to_bob { (&bob, &alice) } else { (&alice, &bob) };
                if let Some(plaintext) = deliver(receiver, sender, &framed, &mut rng) {
                    // Unauthenticated pre-key header fields may change
                    // without affecting the ratchet message.
                    assert_eq!(plaintext, message.plaintext, "corruption changed plaintext");
                    assert!(decrypted.insert(message.id), "message {} decrypted twice", message.id);
                }
            },
        }
    }

    for message in in_flight.drain(..) {
        let (receiver, sender) = if message.to_bob { (&bob, &alice) } else { (&alice, &bob) };
        if let Some(plaintext) = deliver(receiver, sender, &message.framed, &mut rng) {
            assert_eq!(plaintext, message.plaintext, "wrong plaintext");
            assert!(decrypted.insert(message.id), "message {} decrypted twice", message.id);
        }
    }

    for (sender, receiver) in [(&alice, &bob), (&bob, &alice)] {
        if !sender.store.contains_session(&receiver.address).unwrap_or(false) {
            continue;
        }
        let fresh = SessionCipher::new(&sender.store, receiver.address.clone())
            .encrypt(b"fresh")
            .expect("encrypt on an existing session");
        assert_eq!(
            deliver(receiver, sender, &fresh.to_framed(), &mut rng).as_deref(),
            Some(&b"fresh"[..]),
            "fresh message from {} failed",
            sender.address
        );
    }
});
