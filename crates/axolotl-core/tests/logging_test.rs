//! Rejections and evictions leave a trace in the logs.
#![allow(clippy::disallowed_types, reason = "Collecting events from one test thread")]

use std::sync::{Arc, Mutex};

use axolotl_core::{
    GroupCipher, MemoryStore, PreKeyBundle, ProtocolAddress, SenderKeyName, SessionCipher,
    SignalError, keys,
};
use axolotl_crypto::KeyPair;
use axolotl_proto::{CiphertextMessage, SenderKeyMessage, SignalMessage};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Layer,
    layer::{Context, SubscriberExt},
};

/// Keeps the message of every event.
#[derive(Clone, Default)]
struct Recorder {
    messages: Arc<Mutex<Vec<String>>>,
}

struct MessageField<'a>(&'a mut Option<String>);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for Recorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageField(&mut message));
        if let Some(message) = message {
            self.messages.lock().unwrap().push(message);
        }
    }
}

impl Recorder {
    /// Run `f` with this recorder as the thread's subscriber.
    fn capture(&self, f: impl FnOnce()) {
        tracing::subscriber::with_default(tracing_subscriber::registry().with(self.clone()), f);
    }

    fn saw(&self, message: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|logged| logged == message)
    }
}

fn party(rng: &mut ChaCha20Rng) -> (MemoryStore, KeyPair, u32) {
    let identity = keys::generate_identity_key_pair(rng);
    let registration_id = keys::generate_registration_id(rng);
    (MemoryStore::new(identity.clone(), registration_id), identity, registration_id)
}

fn cipher<'a>(
    store: &'a MemoryStore,
    peer: &str,
) -> SessionCipher<'a, ProtocolAddress, MemoryStore> {
    SessionCipher::new(store, ProtocolAddress::new(peer, 1))
}

/// Alice and Bob with a confirmed session in both directions.
fn established(rng: &mut ChaCha20Rng) -> (MemoryStore, MemoryStore) {
    let (alice, _, _) = party(rng);
    let (bob, identity, registration_id) = party(rng);

    let signed = keys::rotate_signed_pre_key(&bob, &identity, rng, 0).unwrap();
    let pre_key = keys::create_pre_keys(&bob, rng, 1).unwrap().pop();
    let bundle = PreKeyBundle::new(
        registration_id,
        1,
        pre_key.map(|record| (record.id(), record.key_pair().public_key)),
        signed.id(),
        signed.key_pair().public_key,
        signed.signature().to_vec(),
        identity.public_key,
    );
    cipher(&alice, "bob").process_pre_key_bundle(&bundle, rng).unwrap();

    let hello = cipher(&alice, "bob").encrypt(b"hello").unwrap();
    cipher(&bob, "alice").decrypt(&hello, rng).unwrap();
    let reply = cipher(&bob, "alice").encrypt(b"hi").unwrap();
    cipher(&alice, "bob").decrypt(&reply, rng).unwrap();
    (alice, bob)
}

#[test]
fn skipped_key_rejections_are_logged() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let (alice, bob) = established(&mut rng);
    let messages: Vec<_> = (0..2003u32)
        .map(|i| cipher(&alice, "bob").encrypt(&i.to_be_bytes()).unwrap())
        .collect();

    let recorder = Recorder::default();
    recorder.capture(|| {
        let from_alice = cipher(&bob, "alice");
        assert!(matches!(
            from_alice.decrypt(&messages[2001], &mut rng),
            Err(SignalError::InvalidMessage { .. })
        ));
        from_alice.decrypt(&messages[2000], &mut rng).unwrap();
        from_alice.decrypt(&messages[2002], &mut rng).unwrap();
        assert!(matches!(
            from_alice.decrypt(&messages[2000], &mut rng),
            Err(SignalError::DuplicateMessage { .. })
        ));
    });

    assert!(recorder.saw("rejected message too far in the future"));
    assert!(recorder.saw("evicted skipped message keys"));
    assert!(recorder.saw("rejected duplicate message"));
}

#[test]
fn bad_mac_is_logged() {
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let (alice, bob) = established(&mut rng);

    let message = cipher(&alice, "bob").encrypt(b"authentic").unwrap();
    let CiphertextMessage::Signal(signal) = &message else {
        panic!("expected a signal message");
    };
    let mut bytes = signal.serialized().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let forged = SignalMessage::from_bytes(&bytes).unwrap();

    let recorder = Recorder::default();
    recorder.capture(|| {
        assert_eq!(
            cipher(&bob, "alice").decrypt_signal_message(&forged, &mut rng).unwrap_err(),
            SignalError::InvalidMac
        );
    });
    assert!(recorder.saw("rejected message with bad MAC"));
}

#[test]
fn receiver_chain_eviction_is_logged() {
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let (alice, bob) = established(&mut rng);

    let recorder = Recorder::default();
    recorder.capture(|| {
        for round in 0..7u8 {
            let ping = cipher(&alice, "bob").encrypt(&[round]).unwrap();
            cipher(&bob, "alice").decrypt(&ping, &mut rng).unwrap();
            let pong = cipher(&bob, "alice").encrypt(&[round]).unwrap();
            cipher(&alice, "bob").decrypt(&pong, &mut rng).unwrap();
        }
    });
    assert!(recorder.saw("evicted receiver chain"));
}

#[test]
fn duplicate_sender_key_message_is_logged() {
    let mut rng = ChaCha20Rng::seed_from_u64(4);
    let (alice, _, _) = party(&mut rng);
    let (bob, _, _) = party(&mut rng);
    let name = SenderKeyName::new("book club", ProtocolAddress::new("alice", 1));

    let sender = GroupCipher::new(&alice, name.clone());
    let receiver = GroupCipher::new(&bob, name);
    receiver.process(&sender.create_session(&mut rng).unwrap()).unwrap();
    let message = sender.encrypt(b"minutes", &mut rng).unwrap();
    let wire = SenderKeyMessage::from_bytes(message.serialized()).unwrap();
    receiver.decrypt(&wire).unwrap();

    let recorder = Recorder::default();
    recorder.capture(|| {
        assert!(matches!(receiver.decrypt(&wire), Err(SignalError::DuplicateMessage { .. })));
    });
    assert!(recorder.saw("rejected duplicate sender key message"));
}
