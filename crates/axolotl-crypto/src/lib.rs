//! Axolotl Cryptographic Primitives
//!
//! Curve25519 keys and the key-derivation hierarchy behind the Double
//! Ratchet and the sender-key group ratchet. Pure functions with
//! deterministic outputs; operations needing entropy take a caller-supplied
//! `RngCore + CryptoRng`.
//!
//! # Key Lifecycle
//!
//! ```text
//! X3DH agreements (3 or 4 DH outputs)
//!        │
//!        ▼
//! HKDF("WhisperText") → RootKey + ChainKey
//!        │
//!        ▼
//! DH ratchet: HKDF(salt = RootKey, "WhisperRatchet") → RootKey' + ChainKey
//!        │
//!        ▼
//! Symmetric ratchet: HMAC(ck, 0x02) → next ChainKey
//!                    HMAC(ck, 0x01) → HKDF("WhisperMessageKeys") → MessageKeys
//!        │
//!        ▼
//! AES-256-CBC + HMAC-SHA256 → ciphertext
//! ```
//!
//! Group messages use a single [`SenderChainKey`] per sender with the same
//! HMAC step and `HKDF("WhisperGroup")` expanding each message seed into an
//! IV and cipher key.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys only move forward; previous keys cannot be recomputed
//! - Key material is zeroized on drop
//!
//! Break-in Recovery:
//! - Each DH ratchet step mixes a fresh agreement into the root key
//!
//! Key Validation:
//! - Public keys must carry the 0x05 type tag
//! - Private keys must be clamped
//! - Low-order peer keys are rejected during agreement

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod curve;
pub mod error;
pub mod kdf;
pub mod ratchet;
pub mod sender_keys;

pub use cipher::{aes_256_cbc_decrypt, aes_256_cbc_encrypt, constant_time_eq, hmac_sha256};
pub use curve::{
    DJB_TYPE, KEY_LENGTH, KeyPair, PUBLIC_KEY_LENGTH, PrivateKey, PublicKey, SIGNATURE_LENGTH,
};
pub use error::CryptoError;
pub use kdf::derive_secrets;
pub use ratchet::{ChainKey, DISCONTINUITY_LENGTH, MessageKeys, RootKey, initial_keys};
pub use sender_keys::{SenderChainKey, SenderMessageKey};
