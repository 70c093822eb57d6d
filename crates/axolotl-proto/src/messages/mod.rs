//! Typed wire messages and the message-type framing layer
//!
//! Transports carry a one-byte [`CiphertextMessageType`] ahead of the
//! message body so the receiver knows which parser to use. The body itself
//! starts with the version byte.

mod prekey;
mod sender_key;
mod signal;

pub use prekey::PreKeySignalMessage;
pub use sender_key::{SenderKeyDistributionMessage, SenderKeyMessage};
pub use signal::{MAC_LENGTH, MacContext, SignalMessage};

use crate::errors::{ProtocolError, Result};

/// Message-type discriminator used by the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CiphertextMessageType {
    /// [`SignalMessage`]
    Whisper = 2,
    /// [`PreKeySignalMessage`]
    PreKey = 3,
    /// [`SenderKeyMessage`]
    SenderKey = 4,
    /// [`SenderKeyDistributionMessage`]
    SenderKeyDistribution = 5,
}

impl TryFrom<u8> for CiphertextMessageType {
    type Error = ProtocolError;

    fn try_from(kind: u8) -> Result<Self> {
        match kind {
            2 => Ok(Self::Whisper),
            3 => Ok(Self::PreKey),
            4 => Ok(Self::SenderKey),
            5 => Ok(Self::SenderKeyDistribution),
            _ => Err(ProtocolError::UnknownMessageType { kind }),
        }
    }
}

/// Any message the engine produces or consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextMessage {
    /// Ratchet message on an established session
    Signal(SignalMessage),
    /// Ratchet message carrying handshake data
    PreKey(PreKeySignalMessage),
    /// Group message
    SenderKey(SenderKeyMessage),
    /// Group key announcement
    SenderKeyDistribution(SenderKeyDistributionMessage),
}

impl CiphertextMessage {
    /// Discriminator for the framing layer.
    pub fn message_type(&self) -> CiphertextMessageType {
        match self {
            Self::Signal(_) => CiphertextMessageType::Whisper,
            Self::PreKey(_) => CiphertextMessageType::PreKey,
            Self::SenderKey(_) => CiphertextMessageType::SenderKey,
            Self::SenderKeyDistribution(_) => CiphertextMessageType::SenderKeyDistribution,
        }
    }

    /// Body bytes, starting with the version byte.
    pub fn serialize(&self) -> &[u8] {
        match self {
            Self::Signal(message) => message.serialized(),
            Self::PreKey(message) => message.serialized(),
            Self::SenderKey(message) => message.serialized(),
            Self::SenderKeyDistribution(message) => message.serialized(),
        }
    }

    /// Parse a body whose type is already known.
    pub fn from_parts(kind: CiphertextMessageType, body: &[u8]) -> Result<Self> {
        Ok(match kind {
            CiphertextMessageType::Whisper => Self::Signal(SignalMessage::from_bytes(body)?),
            CiphertextMessageType::PreKey => Self::PreKey(PreKeySignalMessage::from_bytes(body)?),
            CiphertextMessageType::SenderKey => {
                Self::SenderKey(SenderKeyMessage::from_bytes(body)?)
            },
            CiphertextMessageType::SenderKeyDistribution => {
                Self::SenderKeyDistribution(SenderKeyDistributionMessage::from_bytes(body)?)
            },
        })
    }

    /// `[type byte] + [body]`.
    pub fn to_framed(&self) -> Vec<u8> {
        let body = self.serialize();
        let mut framed = Vec::with_capacity(1 + body.len());
        framed.push(self.message_type() as u8);
        framed.extend_from_slice(body);
        framed
    }

    /// Inverse of [`to_framed`](Self::to_framed).
    ///
    /// # Errors
    ///
    /// - `MessageTooShort` for empty input
    /// - `UnknownMessageType` for an unknown type byte
    /// - Any error of the selected message parser
    pub fn from_framed(bytes: &[u8]) -> Result<Self> {
        let Some((&kind, body)) = bytes.split_first() else {
            return Err(ProtocolError::MessageTooShort { actual: 0, minimum: 1 });
        };
        Self::from_parts(CiphertextMessageType::try_from(kind)?, body)
    }
}

impl From<SignalMessage> for CiphertextMessage {
    fn from(message: SignalMessage) -> Self {
        Self::Signal(message)
    }
}

impl From<PreKeySignalMessage> for CiphertextMessage {
    fn from(message: PreKeySignalMessage) -> Self {
        Self::PreKey(message)
    }
}

impl From<SenderKeyMessage> for CiphertextMessage {
    fn from(message: SenderKeyMessage) -> Self {
        Self::SenderKey(message)
    }
}

impl From<SenderKeyDistributionMessage> for CiphertextMessage {
    fn from(message: SenderKeyDistributionMessage) -> Self {
        Self::SenderKeyDistribution(message)
    }
}
