//! Axolotl session engine
//!
//! Pairwise Double Ratchet sessions and sender-key group messaging on top of
//! [`axolotl_crypto`] and [`axolotl_proto`].
//!
//! # Architecture
//!
//! The engine is synchronous and holds no state between calls. Everything
//! mutable lives in records behind the store traits in [`storage`]; each
//! operation loads a record, works on a copy and writes it back only on
//! success. Callers serialize operations per address.
//!
//! # Components
//!
//! - [`SessionBuilder`]: handshake from a [`PreKeyBundle`] or an incoming
//!   pre-key message
//! - [`SessionCipher`]: pairwise encrypt / decrypt, DH ratchet, skipped keys
//! - [`GroupCipher`]: sender-key distribution, group encrypt / decrypt
//! - [`MemoryStore`]: in-memory implementation of every store trait
//! - [`keys`]: identity, prekey and sender key generation
//!
//! # Example
//!
//! ```
//! use axolotl_core::{
//!     MemoryStore, ProtocolAddress, SessionCipher, keys,
//!     storage::{IdentityKeyStore, SignedPreKeyStore},
//!     PreKeyBundle,
//! };
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(7);
//! let alice: MemoryStore = MemoryStore::new(keys::generate_identity_key_pair(&mut rng), 1);
//! let bob: MemoryStore = MemoryStore::new(keys::generate_identity_key_pair(&mut rng), 2);
//!
//! let bob_identity = bob.identity_key_pair().unwrap();
//! let signed = keys::rotate_signed_pre_key(&bob, &bob_identity, &mut rng, 0).unwrap();
//! let bundle = PreKeyBundle::new(
//!     2,
//!     1,
//!     None,
//!     signed.id(),
//!     signed.key_pair().public_key,
//!     signed.signature().to_vec(),
//!     bob_identity.public_key,
//! );
//!
//! let to_bob = SessionCipher::new(&alice, ProtocolAddress::new("bob", 1));
//! to_bob.process_pre_key_bundle(&bundle, &mut rng).unwrap();
//! let message = to_bob.encrypt(b"hello").unwrap();
//!
//! let from_alice = SessionCipher::new(&bob, ProtocolAddress::new("alice", 1));
//! assert_eq!(from_alice.decrypt(&message, &mut rng).unwrap(), b"hello");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod address;
pub mod consts;
pub mod error;
pub mod group;
pub mod keys;
mod session_builder;
mod session_cipher;
pub mod state;
pub mod storage;

pub use address::{Address, GroupAddress, ProtocolAddress, SenderKeyName};
pub use error::{Result, SignalError};
pub use group::{GroupCipher, SenderKeyRecord, SenderKeyState};
pub use session_builder::SessionBuilder;
pub use session_cipher::SessionCipher;
pub use state::{
    PendingPreKey, PreKeyBundle, PreKeyRecord, ReceiverChain, SenderChain, SessionRecord,
    SessionState, SignedPreKeyRecord,
};
pub use storage::{
    IdentityKeyStore, MemoryStore, PreKeyStore, ProtocolStore, SenderKeyStore, SessionStore,
    SignedPreKeyStore, StorageError,
};
