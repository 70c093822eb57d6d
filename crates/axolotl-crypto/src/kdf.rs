//! HKDF-SHA256 key derivation
//!
//! Standard RFC 5869 extract-then-expand. The expand counter starts at 1,
//! and a missing salt is equivalent to 32 zero bytes.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;

/// Largest output HKDF-SHA256 can produce (255 hash blocks)
pub const MAX_OUTPUT_LENGTH: usize = 255 * 32;

/// Derive `output_length` bytes from `material`.
///
/// # Errors
///
/// - `InvalidOutputLength` if `output_length` exceeds [`MAX_OUTPUT_LENGTH`]
pub fn derive_secrets(
    material: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output_length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(salt, material);
    let mut okm = vec![0u8; output_length];
    hkdf.expand(info, &mut okm)
        .map_err(|_| CryptoError::InvalidOutputLength { requested: output_length })?;
    Ok(okm)
}

/// Fixed-size variant of [`derive_secrets`] for the ratchet's own lengths.
pub(crate) fn derive_array<const N: usize>(
    material: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
) -> [u8; N] {
    let hkdf = Hkdf::<Sha256>::new(salt, material);
    let mut okm = [0u8; N];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("ratchet output lengths are far below the HKDF limit");
    };
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5869 test case 1
    #[test]
    fn rfc5869_case_1() {
        let ikm = [0x0bu8; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let okm = derive_secrets(&ikm, Some(&salt), &info, 42).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn zero_salt_matches_missing_salt() {
        let material = b"input key material";
        let with_zero = derive_secrets(material, Some(&[0u8; 32]), b"info", 64).unwrap();
        let without = derive_secrets(material, None, b"info", 64).unwrap();
        assert_eq!(with_zero, without);
    }

    #[test]
    fn shorter_output_is_prefix() {
        let long = derive_secrets(b"material", None, b"info", 80).unwrap();
        let short = derive_secrets(b"material", None, b"info", 32).unwrap();
        assert_eq!(&long[..32], short.as_slice());
    }

    #[test]
    fn info_separates_domains() {
        let a = derive_secrets(b"material", None, b"WhisperText", 32).unwrap();
        let b = derive_secrets(b"material", None, b"WhisperRatchet", 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_output_is_rejected() {
        let err = derive_secrets(b"material", None, b"info", MAX_OUTPUT_LENGTH + 1).unwrap_err();
        assert_eq!(err, CryptoError::InvalidOutputLength { requested: MAX_OUTPUT_LENGTH + 1 });
    }

    #[test]
    fn array_variant_matches_vec_variant() {
        let array: [u8; 48] = derive_array(b"material", None, b"WhisperGroup");
        let vec = derive_secrets(b"material", None, b"WhisperGroup", 48).unwrap();
        assert_eq!(array.as_slice(), vec.as_slice());
    }
}
