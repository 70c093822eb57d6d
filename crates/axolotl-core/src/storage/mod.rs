//! Storage abstraction for protocol state
//!
//! Five narrow traits, one per kind of record. The traits are synchronous
//! and take `&self`: implementations typically share internal state via
//! `Arc`, so clones access the same underlying storage. Records cross the
//! boundary by value; stores decide how to persist them (the in-memory
//! store keeps CBOR bytes, exactly as a disk store would).
//!
//! Ciphers never hand a partially updated record to a store. A failed
//! decrypt leaves every store untouched.

mod error;
mod memory;

use axolotl_crypto::{KeyPair, PublicKey};
pub use error::StorageError;
pub use memory::MemoryStore;

use crate::{
    address::{Address, GroupAddress},
    group::SenderKeyRecord,
    state::{PreKeyRecord, SessionRecord, SignedPreKeyRecord},
};

/// Our identity and the identities we have seen.
pub trait IdentityKeyStore<A: Address> {
    /// Our long-term identity key pair.
    fn identity_key_pair(&self) -> Result<KeyPair, StorageError>;

    /// Our registration id.
    fn local_registration_id(&self) -> Result<u32, StorageError>;

    /// Remember `identity` for `address`.
    ///
    /// Returns true if a different identity was replaced.
    fn save_identity(&self, address: &A, identity: &PublicKey) -> Result<bool, StorageError>;

    /// Trust on first use: true if nothing is stored for `address` or the
    /// stored identity equals `identity`.
    fn is_trusted_identity(&self, address: &A, identity: &PublicKey)
    -> Result<bool, StorageError>;

    /// Stored identity for `address`, if any.
    fn identity(&self, address: &A) -> Result<Option<PublicKey>, StorageError>;
}

/// One-time prekeys.
pub trait PreKeyStore {
    /// Load a prekey. `None` if absent.
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError>;

    /// Store a prekey, replacing any with the same id.
    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError>;

    /// Whether a prekey with `id` is stored.
    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError>;

    /// Remove a prekey. Removing an absent id is not an error.
    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError>;

    /// Highest prekey id handed out so far, 0 if none.
    fn last_pre_key_id(&self) -> Result<u32, StorageError>;

    /// Record the highest prekey id handed out.
    fn set_last_pre_key_id(&self, id: u32) -> Result<(), StorageError>;
}

/// Signed prekeys.
pub trait SignedPreKeyStore {
    /// Load a signed prekey. `None` if absent.
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError>;

    /// Store a signed prekey, replacing any with the same id.
    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError>;

    /// Whether a signed prekey with `id` is stored.
    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError>;

    /// Remove a signed prekey. Removing an absent id is not an error.
    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError>;

    /// Ids of all stored signed prekeys, ascending.
    fn all_signed_pre_key_ids(&self) -> Result<Vec<u32>, StorageError>;

    /// Highest signed prekey id handed out so far, 0 if none.
    fn last_signed_pre_key_id(&self) -> Result<u32, StorageError>;

    /// Record the highest signed prekey id handed out.
    fn set_last_signed_pre_key_id(&self, id: u32) -> Result<(), StorageError>;
}

/// Session records, one per remote device.
pub trait SessionStore<A: Address> {
    /// Load the record for `address`. `None` if absent.
    fn load_session(&self, address: &A) -> Result<Option<SessionRecord>, StorageError>;

    /// Store the record for `address`, replacing any existing one.
    fn store_session(&self, address: &A, record: &SessionRecord) -> Result<(), StorageError>;

    /// Whether a record with a current state exists for `address`.
    fn contains_session(&self, address: &A) -> Result<bool, StorageError>;

    /// Delete the record for `address`.
    fn delete_session(&self, address: &A) -> Result<(), StorageError>;

    /// Delete the records of every device of `name`. Returns how many were
    /// deleted.
    fn delete_all_sessions(&self, name: &str) -> Result<usize, StorageError>;

    /// Device ids other than the default device with a record for `name`,
    /// ascending.
    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError>;
}

/// Sender key records, one per (group, sender).
pub trait SenderKeyStore<N: GroupAddress> {
    /// Load the record for `name`. `None` if absent.
    fn load_sender_key(&self, name: &N) -> Result<Option<SenderKeyRecord>, StorageError>;

    /// Store the record for `name`, replacing any existing one.
    fn store_sender_key(&self, name: &N, record: &SenderKeyRecord) -> Result<(), StorageError>;
}

/// Everything a pairwise session needs.
pub trait ProtocolStore<A: Address>:
    IdentityKeyStore<A> + PreKeyStore + SignedPreKeyStore + SessionStore<A>
{
}

impl<A, T> ProtocolStore<A> for T
where
    A: Address,
    T: IdentityKeyStore<A> + PreKeyStore + SignedPreKeyStore + SessionStore<A>,
{
}
