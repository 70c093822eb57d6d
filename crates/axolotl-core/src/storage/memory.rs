#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use axolotl_crypto::{KeyPair, PublicKey};

use super::{
    IdentityKeyStore, PreKeyStore, SenderKeyStore, SessionStore, SignedPreKeyStore, StorageError,
};
use crate::{
    address::{Address, GroupAddress, ProtocolAddress, SenderKeyName},
    consts::DEFAULT_DEVICE_ID,
    group::SenderKeyRecord,
    state::{PreKeyRecord, SessionRecord, SignedPreKeyRecord},
};

/// In-memory store for testing and simulation
///
/// Implements every store trait. Records are held as CBOR bytes, so a
/// record that survives this store survives a real one. All state is wrapped
/// in `Arc<Mutex<>>`; clones share it. A poisoned lock is reported as
/// [`StorageError::Poisoned`].
#[derive(Clone)]
pub struct MemoryStore<A: Address = ProtocolAddress, N: GroupAddress = SenderKeyName> {
    inner: Arc<Mutex<MemoryStoreInner<A, N>>>,
}

struct MemoryStoreInner<A, N> {
    identity_key_pair: KeyPair,
    registration_id: u32,

    /// Remote identities, trust-on-first-use
    identities: HashMap<A, PublicKey>,

    /// Session records by remote device
    sessions: HashMap<A, Vec<u8>>,

    pre_keys: BTreeMap<u32, Vec<u8>>,
    signed_pre_keys: BTreeMap<u32, Vec<u8>>,
    last_pre_key_id: u32,
    last_signed_pre_key_id: u32,

    /// Sender key records by (group, sender)
    sender_keys: HashMap<N, Vec<u8>>,
}

impl<A: Address, N: GroupAddress> MemoryStore<A, N> {
    /// Create an empty store for the given identity.
    pub fn new(identity_key_pair: KeyPair, registration_id: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                identity_key_pair,
                registration_id,
                identities: HashMap::new(),
                sessions: HashMap::new(),
                pre_keys: BTreeMap::new(),
                signed_pre_keys: BTreeMap::new(),
                last_pre_key_id: 0,
                last_signed_pre_key_id: 0,
                sender_keys: HashMap::new(),
            })),
        }
    }

    /// Number of stored session records.
    ///
    /// Useful for debugging and testing.
    pub fn session_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.sessions.len())
    }

    /// Number of stored one-time prekeys.
    ///
    /// Useful for debugging and testing.
    pub fn pre_key_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.pre_keys.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner<A, N>>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl<A: Address, N: GroupAddress> IdentityKeyStore<A> for MemoryStore<A, N> {
    fn identity_key_pair(&self) -> Result<KeyPair, StorageError> {
        Ok(self.lock()?.identity_key_pair.clone())
    }

    fn local_registration_id(&self) -> Result<u32, StorageError> {
        Ok(self.lock()?.registration_id)
    }

    fn save_identity(&self, address: &A, identity: &PublicKey) -> Result<bool, StorageError> {
        let previous = self.lock()?.identities.insert(address.clone(), *identity);
        Ok(previous.is_some_and(|previous| previous != *identity))
    }

    fn is_trusted_identity(
        &self,
        address: &A,
        identity: &PublicKey,
    ) -> Result<bool, StorageError> {
        Ok(self.lock()?.identities.get(address).is_none_or(|known| known == identity))
    }

    fn identity(&self, address: &A) -> Result<Option<PublicKey>, StorageError> {
        Ok(self.lock()?.identities.get(address).copied())
    }
}

impl<A: Address, N: GroupAddress> PreKeyStore for MemoryStore<A, N> {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        let inner = self.lock()?;
        inner.pre_keys.get(&id).map(|bytes| PreKeyRecord::from_bytes(bytes)).transpose()
    }

    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError> {
        let bytes = record.to_bytes()?;
        self.lock()?.pre_keys.insert(record.id(), bytes);
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        Ok(self.lock()?.pre_keys.contains_key(&id))
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.lock()?.pre_keys.remove(&id);
        Ok(())
    }

    fn last_pre_key_id(&self) -> Result<u32, StorageError> {
        Ok(self.lock()?.last_pre_key_id)
    }

    fn set_last_pre_key_id(&self, id: u32) -> Result<(), StorageError> {
        self.lock()?.last_pre_key_id = id;
        Ok(())
    }
}

impl<A: Address, N: GroupAddress> SignedPreKeyStore for MemoryStore<A, N> {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        let inner = self.lock()?;
        inner
            .signed_pre_keys
            .get(&id)
            .map(|bytes| SignedPreKeyRecord::from_bytes(bytes))
            .transpose()
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError> {
        let bytes = record.to_bytes()?;
        self.lock()?.signed_pre_keys.insert(record.id(), bytes);
        Ok(())
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        Ok(self.lock()?.signed_pre_keys.contains_key(&id))
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.lock()?.signed_pre_keys.remove(&id);
        Ok(())
    }

    fn all_signed_pre_key_ids(&self) -> Result<Vec<u32>, StorageError> {
        Ok(self.lock()?.signed_pre_keys.keys().copied().collect())
    }

    fn last_signed_pre_key_id(&self) -> Result<u32, StorageError> {
        Ok(self.lock()?.last_signed_pre_key_id)
    }

    fn set_last_signed_pre_key_id(&self, id: u32) -> Result<(), StorageError> {
        self.lock()?.last_signed_pre_key_id = id;
        Ok(())
    }
}

impl<A: Address, N: GroupAddress> SessionStore<A> for MemoryStore<A, N> {
    fn load_session(&self, address: &A) -> Result<Option<SessionRecord>, StorageError> {
        let inner = self.lock()?;
        inner.sessions.get(address).map(|bytes| SessionRecord::from_bytes(bytes)).transpose()
    }

    fn store_session(&self, address: &A, record: &SessionRecord) -> Result<(), StorageError> {
        let bytes = record.to_bytes()?;
        self.lock()?.sessions.insert(address.clone(), bytes);
        Ok(())
    }

    fn contains_session(&self, address: &A) -> Result<bool, StorageError> {
        Ok(self.load_session(address)?.is_some_and(|record| record.session_state().is_some()))
    }

    fn delete_session(&self, address: &A) -> Result<(), StorageError> {
        self.lock()?.sessions.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|address, _| address.name() != name);
        Ok(before - inner.sessions.len())
    }

    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError> {
        let inner = self.lock()?;
        let mut devices: Vec<u32> = inner
            .sessions
            .keys()
            .filter(|address| address.name() == name && address.device_id() != DEFAULT_DEVICE_ID)
            .map(Address::device_id)
            .collect();
        devices.sort_unstable();
        Ok(devices)
    }
}

impl<A: Address, N: GroupAddress> SenderKeyStore<N> for MemoryStore<A, N> {
    fn load_sender_key(&self, name: &N) -> Result<Option<SenderKeyRecord>, StorageError> {
        let inner = self.lock()?;
        inner.sender_keys.get(name).map(|bytes| SenderKeyRecord::from_bytes(bytes)).transpose()
    }

    fn store_sender_key(&self, name: &N, record: &SenderKeyRecord) -> Result<(), StorageError> {
        let bytes = record.to_bytes()?;
        self.lock()?.sender_keys.insert(name.clone(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn store(rng: &mut ChaCha20Rng) -> MemoryStore {
        MemoryStore::new(KeyPair::generate(rng), 42)
    }

    #[test]
    fn identity_trust_on_first_use() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let store = store(&mut rng);
        let bob = ProtocolAddress::new("bob", 1);
        let first = KeyPair::generate(&mut rng).public_key;
        let second = KeyPair::generate(&mut rng).public_key;

        assert!(store.is_trusted_identity(&bob, &first).unwrap());
        assert!(!store.save_identity(&bob, &first).unwrap());
        assert!(store.is_trusted_identity(&bob, &first).unwrap());
        assert!(!store.is_trusted_identity(&bob, &second).unwrap());

        assert!(store.save_identity(&bob, &second).unwrap());
        assert_eq!(store.identity(&bob).unwrap(), Some(second));
    }

    #[test]
    fn pre_keys_store_and_remove() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let store = store(&mut rng);
        let record = PreKeyRecord::new(5, KeyPair::generate(&mut rng));

        store.store_pre_key(&record).unwrap();
        assert!(store.contains_pre_key(5).unwrap());
        assert_eq!(store.load_pre_key(5).unwrap(), Some(record));

        store.remove_pre_key(5).unwrap();
        assert!(!store.contains_pre_key(5).unwrap());
        assert_eq!(store.load_pre_key(5).unwrap(), None);
        store.remove_pre_key(5).unwrap();
    }

    #[test]
    fn signed_pre_key_ids_sorted() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let store = store(&mut rng);
        for id in [9, 2, 5] {
            let record = SignedPreKeyRecord::new(id, KeyPair::generate(&mut rng), vec![0; 64], 0);
            store.store_signed_pre_key(&record).unwrap();
        }

        assert_eq!(store.all_signed_pre_key_ids().unwrap(), vec![2, 5, 9]);
        store.remove_signed_pre_key(5).unwrap();
        assert_eq!(store.all_signed_pre_key_ids().unwrap(), vec![2, 9]);
    }

    #[test]
    fn sessions_by_device() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let store = store(&mut rng);
        let record = SessionRecord::new_fresh();
        for device in [1, 3, 2] {
            store.store_session(&ProtocolAddress::new("bob", device), &record).unwrap();
        }
        store.store_session(&ProtocolAddress::new("carol", 4), &record).unwrap();

        assert_eq!(store.sub_device_sessions("bob").unwrap(), vec![2, 3]);
        assert!(!store.contains_session(&ProtocolAddress::new("bob", 1)).unwrap());

        assert_eq!(store.delete_all_sessions("bob").unwrap(), 3);
        assert_eq!(store.session_count().unwrap(), 1);
        assert!(store.load_session(&ProtocolAddress::new("bob", 2)).unwrap().is_none());
    }

    #[test]
    fn clones_share_state() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let store = store(&mut rng);
        let clone = store.clone();

        clone.set_last_pre_key_id(17).unwrap();
        assert_eq!(store.last_pre_key_id().unwrap(), 17);
    }
}
