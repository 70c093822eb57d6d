//! Errors surfaced by sessions, the group cipher and the stores.
//!
//! Every public operation returns [`SignalError`]. Failures leave stored
//! state untouched: the ciphers mutate a copy and persist it only after the
//! whole operation succeeded.

use axolotl_crypto::CryptoError;
use axolotl_proto::ProtocolError;
use thiserror::Error;

use crate::storage::StorageError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors from session building, pairwise and group encryption.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Key material is malformed or unusable for the requested operation
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// What was wrong with the key
        reason: String,
    },

    /// A signature did not verify
    #[error("invalid signature on {context}")]
    InvalidSignature {
        /// What was signed
        context: &'static str,
    },

    /// A prekey referenced by a bundle or message is not in the store
    #[error("no {kind} with id {id}")]
    InvalidKeyId {
        /// `"pre key"` or `"signed pre key"`
        kind: &'static str,
        /// Missing id
        id: u32,
    },

    /// A group message names a sender key state we do not have
    #[error("no sender key state for key id {key_id}")]
    InvalidSenderKeyId {
        /// Missing key id
        key_id: u32,
    },

    /// Message is structurally valid but cannot be decrypted
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// Why the message was rejected
        reason: String,
    },

    /// Message uses a version newer than we understand
    #[error("unsupported message version {version}")]
    InvalidVersion {
        /// Version nibble from the message
        version: u8,
    },

    /// Message uses a version older than we accept
    #[error("legacy message version {version}")]
    LegacyMessage {
        /// Version nibble from the message
        version: u8,
    },

    /// Message key for this counter was already used (or evicted)
    #[error("duplicate message: counter {counter} is behind chain index {chain_index}")]
    DuplicateMessage {
        /// Current chain index
        chain_index: u32,
        /// Counter carried by the message
        counter: u32,
    },

    /// No session (or sender key record) exists for the address
    #[error("no session for {address}")]
    NoSession {
        /// Address the lookup was made for
        address: String,
    },

    /// Message authentication code did not verify
    #[error("invalid MAC")]
    InvalidMac,

    /// Remote identity differs from the one we trust
    #[error("untrusted identity for {address}")]
    UntrustedIdentity {
        /// Address whose identity changed
        address: String,
    },

    /// Wire message could not be parsed
    #[error("invalid protobuf: {reason}")]
    InvalidProtobuf {
        /// Parser diagnostic
        reason: String,
    },

    /// Store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Primitive failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl SignalError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Only storage failures are transient. Everything else is a property of
    /// the message or the stored state and fails identically on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the error means a peer failed authentication.
    ///
    /// Callers should surface these to the user instead of silently dropping
    /// the message.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidMac | Self::InvalidSignature { .. } | Self::UntrustedIdentity { .. }
        )
    }
}

impl From<ProtocolError> for SignalError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::LegacyVersion { version } => Self::LegacyMessage { version },
            ProtocolError::UnsupportedVersion { version } => Self::InvalidVersion { version },
            ProtocolError::InvalidKey(err) => Self::InvalidKey { reason: err.to_string() },
            ProtocolError::MessageTooShort { .. } => Self::InvalidMessage { reason: err.to_string() },
            other => Self::InvalidProtobuf { reason: other.to_string() },
        }
    }
}
