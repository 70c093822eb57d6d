//! Symmetric primitives: AES-256-CBC with PKCS#7 padding, HMAC-SHA256
//!
//! All functions are pure. Keys and IVs come from the ratchet.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Encrypt with AES-256-CBC and PKCS#7 padding.
///
/// The output is always a non-empty multiple of [`BLOCK_SIZE`].
pub fn aes_256_cbc_encrypt(plaintext: &[u8], key: &[u8; 32], iv: &[u8; 16]) -> Vec<u8> {
    let Ok(encryptor) = Aes256CbcEnc::new_from_slices(key, iv) else {
        unreachable!("key and IV lengths are fixed by the signature");
    };
    encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt AES-256-CBC with PKCS#7 padding.
///
/// # Errors
///
/// - `Cipher` if the ciphertext is empty, not block aligned, or the padding
///   is malformed
pub fn aes_256_cbc_decrypt(
    ciphertext: &[u8],
    key: &[u8; 32],
    iv: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Cipher {
            reason: format!("ciphertext length {} is not block aligned", ciphertext.len()),
        });
    }

    let Ok(decryptor) = Aes256CbcDec::new_from_slices(key, iv) else {
        unreachable!("key and IV lengths are fixed by the signature");
    };
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Cipher { reason: "invalid padding".to_string() })
}

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    for part in parts {
        mac.update(part);
    }
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Constant-time equality for MACs and other authenticators.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
