//! Key generation helpers
//!
//! Pure generators take an RNG and return records; the `create_*` /
//! `rotate_*` variants also persist what they generate and keep the
//! store's id counters current.

use axolotl_crypto::{KeyPair, PrivateKey};
use rand::{CryptoRng, Rng, RngCore};

use crate::{
    consts::{MAX_REGISTRATION_ID, MEDIUM_MAX_VALUE},
    error::Result,
    state::{PreKeyRecord, SignedPreKeyRecord},
    storage::{PreKeyStore, SignedPreKeyStore},
};

/// Fresh long-term identity key pair.
pub fn generate_identity_key_pair<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
    KeyPair::generate(rng)
}

/// Prekey id for zero-based position `n`, within `1..MEDIUM_MAX_VALUE`.
fn wrap_id(n: u32) -> u32 {
    n % (MEDIUM_MAX_VALUE - 1) + 1
}

/// Random registration id in `1..=16380`.
pub fn generate_registration_id<R: RngCore + CryptoRng>(rng: &mut R) -> u32 {
    rng.gen_range(1..=MAX_REGISTRATION_ID)
}

/// `count` one-time prekeys with consecutive ids starting at `start`.
///
/// Ids wrap within `1..MEDIUM_MAX_VALUE` and never use 0.
pub fn generate_pre_keys<R: RngCore + CryptoRng>(
    rng: &mut R,
    start: u32,
    count: u32,
) -> Vec<PreKeyRecord> {
    let period = MEDIUM_MAX_VALUE - 1;
    let base = (start.max(1) - 1) % period;
    (0..count)
        .map(|offset| PreKeyRecord::new(wrap_id(base + offset % period), KeyPair::generate(rng)))
        .collect()
}

/// Signed prekey with the identity signature over its 33-byte public key.
pub fn generate_signed_pre_key<R: RngCore + CryptoRng>(
    rng: &mut R,
    identity: &KeyPair,
    id: u32,
    timestamp: u64,
) -> SignedPreKeyRecord {
    let key_pair = KeyPair::generate(rng);
    let signature = identity.calculate_signature(&key_pair.public_key.to_bytes(), rng);
    SignedPreKeyRecord::new(id, key_pair, signature.to_vec(), timestamp)
}

/// Random 31-bit sender key id.
pub fn generate_sender_key_id<R: RngCore + CryptoRng>(rng: &mut R) -> u32 {
    rng.next_u32() & 0x7FFF_FFFF
}

/// Random sender chain seed.
pub fn generate_sender_key<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    seed
}

/// Sender signing key pair.
pub fn generate_sender_signing_key<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
    KeyPair::from_private_key(PrivateKey::generate(rng))
}

/// Generate `count` prekeys after the store's last id and persist them.
pub fn create_pre_keys<S: PreKeyStore, R: RngCore + CryptoRng>(
    store: &S,
    rng: &mut R,
    count: u32,
) -> Result<Vec<PreKeyRecord>> {
    let start = wrap_id(store.last_pre_key_id()?);
    let records = generate_pre_keys(rng, start, count);
    for record in &records {
        store.store_pre_key(record)?;
    }
    if let Some(last) = records.last() {
        store.set_last_pre_key_id(last.id())?;
    }
    tracing::debug!(count, start, "created pre keys");
    Ok(records)
}

/// Generate and persist the next signed prekey.
///
/// The signed prekey two generations back is removed, so the previous one
/// stays available for handshakes still in flight.
pub fn rotate_signed_pre_key<S: SignedPreKeyStore, R: RngCore + CryptoRng>(
    store: &S,
    identity: &KeyPair,
    rng: &mut R,
    timestamp: u64,
) -> Result<SignedPreKeyRecord> {
    let period = MEDIUM_MAX_VALUE - 1;
    let position = store.last_signed_pre_key_id()? % period;
    let id = wrap_id(position);
    let record = generate_signed_pre_key(rng, identity, id, timestamp);
    store.store_signed_pre_key(&record)?;
    store.set_last_signed_pre_key_id(id)?;

    let stale = wrap_id(position + period - 2);
    store.remove_signed_pre_key(stale)?;
    tracing::info!(id, stale, "rotated signed pre key");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn registration_ids_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for _ in 0..1000 {
            let id = generate_registration_id(&mut rng);
            assert!((1..=MAX_REGISTRATION_ID).contains(&id));
        }
    }

    #[test]
    fn pre_key_ids_wrap_and_skip_zero() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let ids: Vec<_> = generate_pre_keys(&mut rng, MEDIUM_MAX_VALUE - 2, 4)
            .iter()
            .map(PreKeyRecord::id)
            .collect();

        assert_eq!(ids, vec![MEDIUM_MAX_VALUE - 2, MEDIUM_MAX_VALUE - 1, 1, 2]);
    }

    #[test]
    fn pre_key_ids_from_huge_start_stay_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let ids: Vec<_> =
            generate_pre_keys(&mut rng, u32::MAX, 3).iter().map(PreKeyRecord::id).collect();

        // u32::MAX - 1 is 510 past a whole number of periods.
        assert_eq!(ids, vec![511, 512, 513]);
    }

    #[test]
    fn create_pre_keys_wraps_after_last_id() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let store: MemoryStore = MemoryStore::new(generate_identity_key_pair(&mut rng), 1);
        store.set_last_pre_key_id(MEDIUM_MAX_VALUE - 2).unwrap();

        let ids: Vec<_> =
            create_pre_keys(&store, &mut rng, 3).unwrap().iter().map(PreKeyRecord::id).collect();

        assert_eq!(ids, vec![MEDIUM_MAX_VALUE - 1, 1, 2]);
        assert_eq!(store.last_pre_key_id().unwrap(), 2);
    }

    #[test]
    fn signed_pre_key_signature_verifies() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let identity = generate_identity_key_pair(&mut rng);
        let record = generate_signed_pre_key(&mut rng, &identity, 5, 1_000);

        assert!(
            identity
                .public_key
                .verify_signature(&record.key_pair().public_key.to_bytes(), record.signature())
                .unwrap()
        );
        assert_eq!(record.id(), 5);
        assert_eq!(record.timestamp(), 1_000);
    }

    #[test]
    fn sender_key_ids_are_31_bit() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        for _ in 0..1000 {
            assert!(generate_sender_key_id(&mut rng) < 1 << 31);
        }
    }

    #[test]
    fn create_pre_keys_continues_numbering() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let store: MemoryStore = MemoryStore::new(generate_identity_key_pair(&mut rng), 1);

        create_pre_keys(&store, &mut rng, 3).unwrap();
        let second = create_pre_keys(&store, &mut rng, 2).unwrap();

        assert_eq!(second.iter().map(PreKeyRecord::id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(store.last_pre_key_id().unwrap(), 5);
        assert_eq!(store.pre_key_count().unwrap(), 5);
    }

    #[test]
    fn rotation_keeps_two_signed_pre_keys() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let identity = generate_identity_key_pair(&mut rng);
        let store: MemoryStore = MemoryStore::new(identity.clone(), 1);

        for timestamp in 0..4 {
            rotate_signed_pre_key(&store, &identity, &mut rng, timestamp).unwrap();
        }

        assert_eq!(store.all_signed_pre_key_ids().unwrap(), vec![3, 4]);
    }

    #[test]
    fn rotation_removes_stale_key_across_wrap() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let identity = generate_identity_key_pair(&mut rng);
        let store: MemoryStore = MemoryStore::new(identity.clone(), 1);
        store.set_last_signed_pre_key_id(MEDIUM_MAX_VALUE - 3).unwrap();

        let ids: Vec<_> = (0..4)
            .map(|timestamp| {
                rotate_signed_pre_key(&store, &identity, &mut rng, timestamp).unwrap().id()
            })
            .collect();

        assert_eq!(ids, vec![MEDIUM_MAX_VALUE - 2, MEDIUM_MAX_VALUE - 1, 1, 2]);
        assert_eq!(store.all_signed_pre_key_ids().unwrap(), vec![1, 2]);
    }
}
