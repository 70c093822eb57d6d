//! Store wrapper that injects storage failures
//!
//! Wraps any store and fails a configurable fraction of calls with
//! [`StorageError::Io`] before they reach the inner store. Failures come
//! from a seeded generator, so a chaos run replays exactly.
//!
//! The ciphers promise that a failed call never leaves a half-written
//! record behind; running them against this wrapper is how that promise
//! is tested.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axolotl_core::{
    Address, GroupAddress, PreKeyRecord, SenderKeyRecord, SessionRecord, SignedPreKeyRecord,
    StorageError,
    storage::{IdentityKeyStore, PreKeyStore, SenderKeyStore, SessionStore, SignedPreKeyStore},
};
use axolotl_crypto::{KeyPair, PublicKey};

const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// Store wrapper that randomly fails operations.
///
/// Clones share the generator and the operation counter.
#[derive(Clone)]
pub struct ChaoticStore<S> {
    inner: S,
    /// 0.0 never fails, 1.0 always fails
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator, constants from Numerical Recipes.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    const A: u64 = 1_664_525;
    const C: u64 = 1_013_904_223;
    const M: u64 = 1 << 32;

    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        self.state = Self::A.wrapping_mul(self.state).wrapping_add(Self::C) % Self::M;
        self.state as f64 / Self::M as f64
    }
}

impl<S> ChaoticStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, DEFAULT_SEED)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store, for oracle checks after a chaos run.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Store calls attempted so far, failed ones included.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Count the call and decide whether it fails.
    fn gate(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        let roll = self.rng.lock().map_err(|_| StorageError::Poisoned)?.next();
        if roll < self.failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<A: Address, S: IdentityKeyStore<A>> IdentityKeyStore<A> for ChaoticStore<S> {
    fn identity_key_pair(&self) -> Result<KeyPair, StorageError> {
        self.gate()?;
        self.inner.identity_key_pair()
    }

    fn local_registration_id(&self) -> Result<u32, StorageError> {
        self.gate()?;
        self.inner.local_registration_id()
    }

    fn save_identity(&self, address: &A, identity: &PublicKey) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.save_identity(address, identity)
    }

    fn is_trusted_identity(
        &self,
        address: &A,
        identity: &PublicKey,
    ) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.is_trusted_identity(address, identity)
    }

    fn identity(&self, address: &A) -> Result<Option<PublicKey>, StorageError> {
        self.gate()?;
        self.inner.identity(address)
    }
}

impl<S: PreKeyStore> PreKeyStore for ChaoticStore<S> {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        self.gate()?;
        self.inner.load_pre_key(id)
    }

    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.store_pre_key(record)
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.contains_pre_key(id)
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.remove_pre_key(id)
    }

    fn last_pre_key_id(&self) -> Result<u32, StorageError> {
        self.gate()?;
        self.inner.last_pre_key_id()
    }

    fn set_last_pre_key_id(&self, id: u32) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.set_last_pre_key_id(id)
    }
}

impl<S: SignedPreKeyStore> SignedPreKeyStore for ChaoticStore<S> {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        self.gate()?;
        self.inner.load_signed_pre_key(id)
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.store_signed_pre_key(record)
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.contains_signed_pre_key(id)
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.remove_signed_pre_key(id)
    }

    fn all_signed_pre_key_ids(&self) -> Result<Vec<u32>, StorageError> {
        self.gate()?;
        self.inner.all_signed_pre_key_ids()
    }

    fn last_signed_pre_key_id(&self) -> Result<u32, StorageError> {
        self.gate()?;
        self.inner.last_signed_pre_key_id()
    }

    fn set_last_signed_pre_key_id(&self, id: u32) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.set_last_signed_pre_key_id(id)
    }
}

impl<A: Address, S: SessionStore<A>> SessionStore<A> for ChaoticStore<S> {
    fn load_session(&self, address: &A) -> Result<Option<SessionRecord>, StorageError> {
        self.gate()?;
        self.inner.load_session(address)
    }

    fn store_session(&self, address: &A, record: &SessionRecord) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.store_session(address, record)
    }

    fn contains_session(&self, address: &A) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.contains_session(address)
    }

    fn delete_session(&self, address: &A) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.delete_session(address)
    }

    fn delete_all_sessions(&self, name: &str) -> Result<usize, StorageError> {
        self.gate()?;
        self.inner.delete_all_sessions(name)
    }

    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>, StorageError> {
        self.gate()?;
        self.inner.sub_device_sessions(name)
    }
}

impl<N: GroupAddress, S: SenderKeyStore<N>> SenderKeyStore<N> for ChaoticStore<S> {
    fn load_sender_key(&self, name: &N) -> Result<Option<SenderKeyRecord>, StorageError> {
        self.gate()?;
        self.inner.load_sender_key(name)
    }

    fn store_sender_key(&self, name: &N, record: &SenderKeyRecord) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.store_sender_key(name, record)
    }
}
