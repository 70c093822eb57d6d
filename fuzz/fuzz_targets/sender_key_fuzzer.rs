//! Fuzz target for sender-key group messaging
//!
//! Alice distributes her sender key to Bob, then the fuzzer interleaves
//! encrypts, out-of-order deliveries, replays, byte flips and repeated
//! distribution of the same key.
//!
//! # Invariants
//!
//! - Nothing panics
//! - A message decrypts at most once, and only to what was encrypted
//! - A flipped byte never yields a different plaintext
//! - After the schedule, a fresh message still decrypts

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use axolotl_core::{GroupCipher, MemoryStore, ProtocolAddress, SenderKeyName, keys};
use axolotl_proto::CiphertextMessage;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const MAX_OPERATIONS: usize = 256;

#[derive(Debug, Clone, Arbitrary)]
struct GroupScenario {
    seed: u64,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    /// Alice encrypts a message of `len` bytes
    Encrypt { len: u8 },
    /// Deliver the in-flight message at `index` to Bob
    Deliver { index: u8 },
    /// Deliver an already delivered message again
    Replay { index: u8 },
    /// Deliver a copy of an in-flight message with one byte flipped
    Corrupt { index: u8, position: u16, flip: u8 },
    /// Alice announces her key again; Bob reinstalls it
    Redistribute,
}

fn deliver(cipher: &GroupCipher<'_, SenderKeyName, MemoryStore>, framed: &[u8]) -> Option<Vec<u8>> {
    match CiphertextMessage::from_framed(framed).ok()? {
        CiphertextMessage::SenderKey(message) => cipher.decrypt(&message).ok(),
        _ => None,
    }
}

fn new_store(rng: &mut ChaCha20Rng) -> MemoryStore {
    MemoryStore::new(keys::generate_identity_key_pair(rng), keys::generate_registration_id(rng))
}

fuzz_target!(|scenario: GroupScenario| {
    let mut rng = ChaCha20Rng::seed_from_u64(scenario.seed);
    let alice_store = new_store(&mut rng);
    let bob_store = new_store(&mut rng);

    let name = SenderKeyName::new("fuzz-group", ProtocolAddress::new("alice", 1));
    let sending = GroupCipher::new(&alice_store, name.clone());
    let receiving = GroupCipher::new(&bob_store, name);

    let distribution = sending.create_session(&mut rng).expect("memory store accepts sender keys");
    receiving.process(&distribution).expect("memory store accepts sender keys");

    let mut in_flight: Vec<(usize, Vec<u8>, Vec<u8>)> = Vec::new();
    let mut delivered: Vec<(usize, Vec<u8>)> = Vec::new();
    let mut decrypted = HashSet::new();

    for (id, operation) in scenario.operations.into_iter().take(MAX_OPERATIONS).enumerate() {
        match operation {
            Operation::Encrypt { len } => {
                let mut plaintext = format!("{id}:").into_bytes();
                plaintext.resize(plaintext.len() + usize::from(len), 0x5C);
                let message =
                    sending.encrypt(&plaintext, &mut rng).expect("sender holds its own key");
                in_flight.push((id, CiphertextMessage::from(message).to_framed(), plaintext));
            },

            Operation::Deliver { index } => {
                if in_flight.is_empty() {
                    continue;
                }
                let (id, framed, plaintext) =
                    in_flight.remove(usize::from(index) % in_flight.len());
                if let Some(actual) = deliver(&receiving, &framed) {
                    assert_eq!(actual, plaintext, "wrong plaintext");
                    assert!(decrypted.insert(id), "message {id} decrypted twice");
                }
                delivered.push((id, framed));
            },

            Operation::Replay { index } => {
                if delivered.is_empty() {
                    continue;
                }
                let (id, framed) = &delivered[usize::from(index) % delivered.len()];
                if decrypted.contains(id) {
                    assert!(deliver(&receiving, framed).is_none(), "replay of {id} decrypted");
                }
            },

            Operation::Corrupt { index, position, flip } => {
                if in_flight.is_empty() || flip == 0 {
                    continue;
                }
                let (id, framed, plaintext) = &in_flight[usize::from(index) % in_flight.len()];
                let mut corrupted = framed.clone();
                let position = usize::from(position) % corrupted.len();
                corrupted[position] ^= flip;

                if let Some(actual) = deliver(&receiving, &corrupted) {
                    assert_eq!(&actual, plaintext, "corruption changed plaintext");
                    assert!(decrypted.insert(*id), "message {id} decrypted twice");
                }
            },

            Operation::Redistribute => {
                let distribution =
                    sending.create_session(&mut rng).expect("memory store accepts sender keys");
                receiving.process(&distribution).expect("memory store accepts sender keys");
            },
        }
    }

    let fresh = sending.encrypt(b"fresh", &mut rng).expect("sender holds its own key");
    assert_eq!(
        deliver(&receiving, &CiphertextMessage::from(fresh).to_framed()).as_deref(),
        Some(&b"fresh"[..]),
        "fresh message failed"
    );
});
