//! Wire format errors

use axolotl_crypto::CryptoError;
use thiserror::Error;

/// Result alias for wire operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from parsing or building wire messages.
///
/// Every variant is permanent for the bytes that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Input shorter than the fixed framing requires
    #[error("message too short: {actual} bytes, need at least {minimum}")]
    MessageTooShort {
        /// Bytes available
        actual: usize,
        /// Bytes required
        minimum: usize,
    },

    /// Version 1 or older
    #[error("legacy message version {version}")]
    LegacyVersion {
        /// Version from the high nibble of the version byte
        version: u8,
    },

    /// Version newer than this implementation speaks
    #[error("unsupported message version {version}")]
    UnsupportedVersion {
        /// Version from the high nibble of the version byte
        version: u8,
    },

    /// Protobuf body failed to decode
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A required protobuf field was absent
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the absent field
        field: &'static str,
    },

    /// A field was present but malformed
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Embedded key material was rejected
    #[error("invalid key: {0}")]
    InvalidKey(#[from] CryptoError),

    /// Framing carried an unknown message type
    #[error("unknown message type {kind}")]
    UnknownMessageType {
        /// The discriminator byte
        kind: u8,
    },
}

impl ProtocolError {
    /// Whether the error is about the protocol version rather than content.
    pub fn is_version_error(&self) -> bool {
        matches!(self, Self::LegacyVersion { .. } | Self::UnsupportedVersion { .. })
    }
}
