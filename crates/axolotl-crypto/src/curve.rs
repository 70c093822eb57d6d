//! Curve25519 key pairs, key agreement and XEdDSA signatures
//!
//! Public keys travel in the 33-byte tagged form (`0x05 ‖ u-coordinate`)
//! everywhere: wire messages, MAC prefixes, signature inputs and persisted
//! records. Private keys are 32-byte clamped scalars and are rejected at
//! construction when the clamp bits are not set.
//!
//! Signatures use XEdDSA: the Montgomery private scalar signs as an Edwards
//! key, and verifiers recover the Edwards point from the Montgomery public
//! key plus the sign bit carried in the top bit of the signature.

use std::fmt;

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE, edwards::EdwardsPoint, montgomery::MontgomeryPoint,
    scalar::Scalar,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Type tag prepended to encoded Curve25519 public keys
pub const DJB_TYPE: u8 = 0x05;

/// Length of a raw Curve25519 point or scalar
pub const KEY_LENGTH: usize = 32;

/// Length of an encoded public key (type tag plus point)
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// Length of an XEdDSA signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Curve25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    point: [u8; KEY_LENGTH],
}

impl PublicKey {
    /// Wrap a raw 32-byte Montgomery u-coordinate.
    pub fn from_point(point: [u8; KEY_LENGTH]) -> Self {
        Self { point }
    }

    /// Decode the 33-byte tagged form.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` unless exactly 33 bytes are given
    /// - `InvalidKeyType` if the first byte is not [`DJB_TYPE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        if bytes[0] != DJB_TYPE {
            return Err(CryptoError::InvalidKeyType { tag: bytes[0] });
        }

        let mut point = [0u8; KEY_LENGTH];
        point.copy_from_slice(&bytes[1..]);
        Ok(Self { point })
    }

    /// Encode as `0x05 ‖ point`.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out[0] = DJB_TYPE;
        out[1..].copy_from_slice(&self.point);
        out
    }

    /// Raw 32-byte point without the type tag.
    pub fn point(&self) -> &[u8; KEY_LENGTH] {
        &self.point
    }

    /// Verify an XEdDSA signature made by the matching private key.
    ///
    /// Returns `Ok(false)` for any well-formed but invalid signature.
    ///
    /// # Errors
    ///
    /// - `InvalidSignatureLength` unless the signature is 64 bytes
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let Ok(signature) = <&[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
            return Err(CryptoError::InvalidSignatureLength { actual: signature.len() });
        };
        Ok(xeddsa_verify(&self.point, message, signature))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for byte in &self.point[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Curve25519 private scalar.
///
/// Always clamped. The scalar is zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    scalar: [u8; KEY_LENGTH],
}

impl PrivateKey {
    /// Generate a fresh clamped scalar.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut scalar = [0u8; KEY_LENGTH];
        rng.fill_bytes(&mut scalar);
        clamp(&mut scalar);
        Self { scalar }
    }

    /// Load a stored scalar.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` unless exactly 32 bytes are given
    /// - `UnclampedPrivateKey` if the clamp bits are not set
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let Ok(scalar) = <[u8; KEY_LENGTH]>::try_from(bytes) else {
            return Err(CryptoError::InvalidKeyLength { expected: KEY_LENGTH, actual: bytes.len() });
        };
        if !is_clamped(&scalar) {
            return Err(CryptoError::UnclampedPrivateKey);
        }
        Ok(Self { scalar })
    }

    /// Raw scalar bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; KEY_LENGTH] {
        self.scalar
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.scalar);
        PublicKey::from_point(X25519PublicKey::from(&secret).to_bytes())
    }

    /// X25519 key agreement.
    ///
    /// # Errors
    ///
    /// - `NonContributoryAgreement` if the peer key is a low-order point
    pub fn calculate_agreement(&self, their_key: &PublicKey) -> Result<[u8; KEY_LENGTH], CryptoError> {
        let secret = StaticSecret::from(self.scalar);
        let shared = secret.diffie_hellman(&X25519PublicKey::from(their_key.point));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributoryAgreement);
        }
        Ok(shared.to_bytes())
    }

    /// Produce an XEdDSA signature over `message`.
    pub fn calculate_signature<R: RngCore + CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> [u8; SIGNATURE_LENGTH] {
        let mut nonce = [0u8; 64];
        rng.fill_bytes(&mut nonce);
        let signature = xeddsa_sign(&self.scalar, message, &nonce);
        nonce.zeroize();
        signature
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.scalar[..].ct_eq(&other.scalar[..]).into()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.scalar.zeroize();
    }
}

/// A private key together with its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Public half
    pub public_key: PublicKey,
    /// Private half
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private_key(PrivateKey::generate(rng))
    }

    /// Complete a key pair from its private half.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        Self { public_key: private_key.public_key(), private_key }
    }

    /// Key agreement with a peer public key.
    pub fn calculate_agreement(&self, their_key: &PublicKey) -> Result<[u8; KEY_LENGTH], CryptoError> {
        self.private_key.calculate_agreement(their_key)
    }

    /// Sign `message` with the private half.
    pub fn calculate_signature<R: RngCore + CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> [u8; SIGNATURE_LENGTH] {
        self.private_key.calculate_signature(message, rng)
    }
}

fn clamp(scalar: &mut [u8; KEY_LENGTH]) {
    scalar[0] &= 0xF8;
    scalar[31] = (scalar[31] & 0x7F) | 0x40;
}

fn is_clamped(scalar: &[u8; KEY_LENGTH]) -> bool {
    scalar[0] & 0x07 == 0 && scalar[31] & 0x80 == 0 && scalar[31] & 0x40 != 0
}

fn xeddsa_sign(scalar: &[u8; KEY_LENGTH], message: &[u8], nonce: &[u8; 64]) -> [u8; SIGNATURE_LENGTH] {
    let a = Scalar::from_bytes_mod_order(*scalar);
    let ed_public = (&a * ED25519_BASEPOINT_TABLE).compress();
    let sign_bit = ed_public.as_bytes()[31] & 0x80;

    let mut hash = Sha512::new();
    hash.update([0xFFu8; 32]);
    hash.update(scalar);
    hash.update(message);
    hash.update(nonce);
    let r = Scalar::from_hash(hash);
    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();

    let mut hash = Sha512::new();
    hash.update(cap_r.as_bytes());
    hash.update(ed_public.as_bytes());
    hash.update(message);
    let h = Scalar::from_hash(hash);
    let s = h * a + r;

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature[SIGNATURE_LENGTH - 1] &= 0x7F;
    signature[SIGNATURE_LENGTH - 1] |= sign_bit;
    signature
}

fn xeddsa_verify(point: &[u8; KEY_LENGTH], message: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> bool {
    let sign = (signature[SIGNATURE_LENGTH - 1] & 0x80) >> 7;
    let Some(ed_public) = MontgomeryPoint(*point).to_edwards(sign) else {
        return false;
    };
    let cap_a = ed_public.compress();

    let mut cap_r = [0u8; 32];
    cap_r.copy_from_slice(&signature[..32]);
    let mut s = [0u8; 32];
    s.copy_from_slice(&signature[32..]);
    s[31] &= 0x7F;
    // s must be reduced
    if s[31] & 0xE0 != 0 {
        return false;
    }

    let mut hash = Sha512::new();
    hash.update(cap_r);
    hash.update(cap_a.as_bytes());
    hash.update(message);
    let h = Scalar::from_hash(hash);

    let check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &-ed_public,
        &Scalar::from_bytes_mod_order(s),
    )
    .compress();

    check.as_bytes()[..].ct_eq(&cap_r[..]).into()
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserializer.deserialize_bytes(BytesVisitor)?;
        PublicKey::from_bytes(&bytes).map_err(de::Error::custom)
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.scalar)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut bytes = deserializer.deserialize_bytes(BytesVisitor)?;
        let key = PrivateKey::from_bytes(&bytes).map_err(de::Error::custom);
        bytes.zeroize();
        key
    }
}

/// Accepts CBOR byte strings as well as plain sequences of `u8`.
struct BytesVisitor;

impl<'de> de::Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("key bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(PUBLIC_KEY_LENGTH));
        while let Some(byte) = seq.next_element::<u8>()? {
            out.push(byte);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    #[test]
    fn generated_keys_are_clamped() {
        let mut rng = rng();
        for _ in 0..32 {
            let key = PrivateKey::generate(&mut rng);
            assert!(is_clamped(&key.to_bytes()));
        }
    }

    #[test]
    fn agreement_is_symmetric() {
        let mut rng = rng();
        let alice = KeyPair::generate(&mut rng);
        let bob = KeyPair::generate(&mut rng);

        let ab = alice.calculate_agreement(&bob.public_key).unwrap();
        let ba = bob.calculate_agreement(&alice.public_key).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn agreement_rejects_low_order_point() {
        let mut rng = rng();
        let alice = KeyPair::generate(&mut rng);
        let zero = PublicKey::from_point([0u8; 32]);

        assert_eq!(alice.calculate_agreement(&zero), Err(CryptoError::NonContributoryAgreement));
    }

    #[test]
    fn signature_verifies() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);
        let message = b"signed prekey bytes";

        let signature = pair.calculate_signature(message, &mut rng);
        assert!(pair.public_key.verify_signature(message, &signature).unwrap());
    }

    #[test]
    fn signature_rejects_tampered_message() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let signature = pair.calculate_signature(b"original", &mut rng);
        assert!(!pair.public_key.verify_signature(b"0riginal", &signature).unwrap());
    }

    #[test]
    fn signature_rejects_wrong_key() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);

        let signature = pair.calculate_signature(b"message", &mut rng);
        assert!(!other.public_key.verify_signature(b"message", &signature).unwrap());
    }

    #[test]
    fn signature_rejects_flipped_bit() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let mut signature = pair.calculate_signature(b"message", &mut rng);
        signature[5] ^= 0x01;
        assert!(!pair.public_key.verify_signature(b"message", &signature).unwrap());
    }

    #[test]
    fn signature_length_is_checked() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let err = pair.public_key.verify_signature(b"message", &[0u8; 63]).unwrap_err();
        assert_eq!(err, CryptoError::InvalidSignatureLength { actual: 63 });
    }

    #[test]
    fn public_key_encoding_is_tagged() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let encoded = pair.public_key.to_bytes();
        assert_eq!(encoded[0], DJB_TYPE);
        assert_eq!(&encoded[1..], pair.public_key.point());
        assert_eq!(PublicKey::from_bytes(&encoded).unwrap(), pair.public_key);
    }

    #[test]
    fn public_key_rejects_raw_and_mistagged_forms() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let err = PublicKey::from_bytes(pair.public_key.point()).unwrap_err();
        assert_eq!(err, CryptoError::InvalidKeyLength { expected: 33, actual: 32 });

        let mut encoded = pair.public_key.to_bytes();
        encoded[0] = 0x06;
        assert_eq!(
            PublicKey::from_bytes(&encoded).unwrap_err(),
            CryptoError::InvalidKeyType { tag: 0x06 }
        );
    }

    #[test]
    fn private_key_rejects_unclamped_scalar() {
        let mut scalar = [0x42u8; 32];
        clamp(&mut scalar);
        assert!(PrivateKey::from_bytes(&scalar).is_ok());

        let mut low_bits = scalar;
        low_bits[0] |= 0x01;
        assert_eq!(PrivateKey::from_bytes(&low_bits), Err(CryptoError::UnclampedPrivateKey));

        let mut high_bit = scalar;
        high_bit[31] |= 0x80;
        assert_eq!(PrivateKey::from_bytes(&high_bit), Err(CryptoError::UnclampedPrivateKey));

        let mut missing_bit = scalar;
        missing_bit[31] &= !0x40;
        assert_eq!(PrivateKey::from_bytes(&missing_bit), Err(CryptoError::UnclampedPrivateKey));
    }

    #[test]
    fn key_pair_survives_cbor() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&pair, &mut buf).unwrap();
        let decoded: KeyPair = ciborium::de::from_reader(buf.as_slice()).unwrap();

        assert_eq!(decoded, pair);
    }

    #[test]
    fn debug_does_not_leak_private_key() {
        let mut rng = rng();
        let pair = KeyPair::generate(&mut rng);
        let rendered = format!("{:?}", pair.private_key);
        assert_eq!(rendered, "PrivateKey(<redacted>)");
    }
}
