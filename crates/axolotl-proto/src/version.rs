//! Protocol version negotiation
//!
//! Every wire message starts with one byte: the high nibble is the sender's
//! message version, the low nibble is the highest version the sender
//! supports (always [`CURRENT_VERSION`] here).
//!
//! The version decides how the message MAC is built, so it is carried as an
//! explicit [`MessageVersion`] through session state rather than as a bare
//! integer.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Highest protocol version this implementation speaks
pub const CURRENT_VERSION: u8 = 3;

/// Negotiated message version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageVersion {
    /// MAC covers the serialized message only
    V2,
    /// MAC is prefixed with the sender and receiver identity keys
    V3,
}

impl MessageVersion {
    /// The version this implementation initiates with.
    pub const CURRENT: MessageVersion = MessageVersion::V3;

    /// Validate a numeric version.
    ///
    /// # Errors
    ///
    /// - `LegacyVersion` for versions 0 and 1
    /// - `UnsupportedVersion` for versions above [`CURRENT_VERSION`]
    pub fn from_u8(version: u8) -> Result<Self> {
        match version {
            0 | 1 => Err(ProtocolError::LegacyVersion { version }),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            _ => Err(ProtocolError::UnsupportedVersion { version }),
        }
    }

    /// Parse the leading version byte of a wire message.
    pub fn from_version_byte(byte: u8) -> Result<Self> {
        Self::from_u8(byte >> 4)
    }

    /// Numeric version.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    /// Leading byte for messages sent at this version.
    pub fn version_byte(self) -> u8 {
        (self.as_u8() << 4) | CURRENT_VERSION
    }

    /// Version both sides can speak.
    pub fn negotiate(self, other: MessageVersion) -> MessageVersion {
        self.min(other)
    }
}

impl TryFrom<u8> for MessageVersion {
    type Error = ProtocolError;

    fn try_from(version: u8) -> Result<Self> {
        Self::from_u8(version)
    }
}
