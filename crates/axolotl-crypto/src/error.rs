//! Error types for key handling and key derivation

use thiserror::Error;

/// Errors from the crypto layer.
///
/// These describe malformed key material or failed primitive operations.
/// None of them are transient: retrying with the same input yields the same
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material had the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Length the key type requires
        expected: usize,
        /// Length that was provided
        actual: usize,
    },

    /// Encoded public key carried an unknown type tag
    #[error("unknown public key type: {tag:#04x}")]
    InvalidKeyType {
        /// The tag byte that was found
        tag: u8,
    },

    /// Private scalar is not clamped for Curve25519
    #[error("private key is not clamped")]
    UnclampedPrivateKey,

    /// Key agreement produced the identity point
    #[error("key agreement produced a non-contributory shared secret")]
    NonContributoryAgreement,

    /// Signature had the wrong length
    #[error("invalid signature length: expected 64 bytes, got {actual}")]
    InvalidSignatureLength {
        /// Length that was provided
        actual: usize,
    },

    /// HKDF was asked for more output than it can produce
    #[error("HKDF output length {requested} exceeds the maximum")]
    InvalidOutputLength {
        /// Number of bytes requested
        requested: usize,
    },

    /// A ratchet index would overflow `u32`
    #[error("ratchet index overflow at {current}")]
    IndexOverflow {
        /// Index at the time of overflow
        current: u32,
    },

    /// Symmetric cipher rejected its input
    #[error("cipher failure: {reason}")]
    Cipher {
        /// Description of the failure
        reason: String,
    },
}

impl CryptoError {
    /// Whether this error came from malformed key material rather than from
    /// a primitive operation.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyLength { .. } | Self::InvalidKeyType { .. } | Self::UnclampedPrivateKey
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_errors_are_classified() {
        assert!(CryptoError::InvalidKeyLength { expected: 33, actual: 32 }.is_key_error());
        assert!(CryptoError::InvalidKeyType { tag: 0x07 }.is_key_error());
        assert!(CryptoError::UnclampedPrivateKey.is_key_error());
        assert!(!CryptoError::NonContributoryAgreement.is_key_error());
        assert!(!CryptoError::Cipher { reason: "bad padding".into() }.is_key_error());
    }

    #[test]
    fn display_includes_values() {
        let err = CryptoError::InvalidKeyLength { expected: 33, actual: 12 };
        assert_eq!(err.to_string(), "invalid key length: expected 33 bytes, got 12");

        let err = CryptoError::InvalidKeyType { tag: 0x07 };
        assert_eq!(err.to_string(), "unknown public key type: 0x07");
    }
}
