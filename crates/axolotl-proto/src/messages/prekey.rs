//! `PreKeySignalMessage`: first messages of an initiator-built session
//!
//! Wraps a `SignalMessage` with everything the responder needs to run the
//! handshake: which prekeys were used, the initiator's base key, identity
//! and registration id.
//!
//! Layout: `[version byte] + [protobuf body]`. No MAC of its own; the inner
//! `SignalMessage` is authenticated after the session is derived.

use axolotl_crypto::PublicKey;
use bytes::Bytes;
use prost::Message;

use crate::{
    errors::{ProtocolError, Result},
    messages::signal::SignalMessage,
    version::MessageVersion,
    wire,
};

/// Handshake-carrying wrapper around a `SignalMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeySignalMessage {
    message_version: MessageVersion,
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
    identity_key: PublicKey,
    message: SignalMessage,
    serialized: Bytes,
}

impl PreKeySignalMessage {
    /// Wrap `message` with handshake metadata.
    pub fn new(
        message_version: MessageVersion,
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: PublicKey,
        identity_key: PublicKey,
        message: SignalMessage,
    ) -> Self {
        let body = wire::PreKeySignalMessage {
            pre_key_id,
            base_key: Some(Bytes::copy_from_slice(&base_key.to_bytes())),
            identity_key: Some(Bytes::copy_from_slice(&identity_key.to_bytes())),
            message: Some(Bytes::copy_from_slice(message.serialized())),
            registration_id: Some(registration_id),
            signed_pre_key_id: Some(signed_pre_key_id),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(message_version.version_byte());
        serialized.extend_from_slice(&body.encode_to_vec());

        Self {
            message_version,
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized: serialized.into(),
        }
    }

    /// Parse a serialized message, including the inner `SignalMessage`.
    ///
    /// # Errors
    ///
    /// - `MessageTooShort` for empty input
    /// - `LegacyVersion` / `UnsupportedVersion` from the version byte
    /// - `Decode` / `MissingField` / `InvalidKey` for a malformed body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((&version_byte, rest)) = bytes.split_first() else {
            return Err(ProtocolError::MessageTooShort { actual: 0, minimum: 1 });
        };

        let message_version = MessageVersion::from_version_byte(version_byte)?;
        let body = wire::PreKeySignalMessage::decode(rest)?;

        let registration_id =
            body.registration_id.ok_or(ProtocolError::MissingField { field: "registration_id" })?;
        let signed_pre_key_id = body
            .signed_pre_key_id
            .ok_or(ProtocolError::MissingField { field: "signed_pre_key_id" })?;
        let base_key = body.base_key.ok_or(ProtocolError::MissingField { field: "base_key" })?;
        let identity_key =
            body.identity_key.ok_or(ProtocolError::MissingField { field: "identity_key" })?;
        let message = body.message.ok_or(ProtocolError::MissingField { field: "message" })?;

        Ok(Self {
            message_version,
            registration_id,
            pre_key_id: body.pre_key_id,
            signed_pre_key_id,
            base_key: PublicKey::from_bytes(&base_key)?,
            identity_key: PublicKey::from_bytes(&identity_key)?,
            message: SignalMessage::from_bytes(&message)?,
            serialized: Bytes::copy_from_slice(bytes),
        })
    }

    /// Version the message was sent with.
    pub fn message_version(&self) -> MessageVersion {
        self.message_version
    }

    /// Initiator's registration id.
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// One-time prekey the initiator consumed, if any.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Signed prekey the initiator used.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Initiator's handshake base key.
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    /// Initiator's identity key.
    pub fn identity_key(&self) -> &PublicKey {
        &self.identity_key
    }

    /// Inner ratchet message.
    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    /// Full wire encoding.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for PreKeySignalMessage {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::signal::MacContext;

    fn key(fill: u8) -> PublicKey {
        PublicKey::from_point([fill; 32])
    }

    fn inner() -> SignalMessage {
        let mac = MacContext {
            sender_identity: &key(0x22),
            receiver_identity: &key(0x33),
            mac_key: &[0x01; 32],
        };
        SignalMessage::new(MessageVersion::V3, key(0x11), 0, 0, Bytes::from_static(b"hello"), &mac)
    }

    #[test]
    fn parse_preserves_handshake_fields() {
        let message =
            PreKeySignalMessage::new(MessageVersion::V3, 4242, Some(17), 3, key(0x44), key(0x22), inner());
        let parsed = PreKeySignalMessage::from_bytes(message.serialized()).unwrap();

        assert_eq!(parsed, message);
        assert_eq!(parsed.registration_id(), 4242);
        assert_eq!(parsed.pre_key_id(), Some(17));
        assert_eq!(parsed.signed_pre_key_id(), 3);
        assert_eq!(parsed.base_key(), &key(0x44));
        assert_eq!(parsed.identity_key(), &key(0x22));
        assert_eq!(parsed.message(), &inner());
    }

    #[test]
    fn one_time_prekey_is_optional() {
        let message =
            PreKeySignalMessage::new(MessageVersion::V3, 1, None, 3, key(0x44), key(0x22), inner());
        let parsed = PreKeySignalMessage::from_bytes(message.serialized()).unwrap();

        assert_eq!(parsed.pre_key_id(), None);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(
            PreKeySignalMessage::from_bytes(&[]).unwrap_err(),
            ProtocolError::MessageTooShort { actual: 0, minimum: 1 }
        );
    }

    #[test]
    fn rejects_missing_signed_pre_key_id() {
        let body = wire::PreKeySignalMessage {
            pre_key_id: None,
            base_key: Some(Bytes::copy_from_slice(&key(0x44).to_bytes())),
            identity_key: Some(Bytes::copy_from_slice(&key(0x22).to_bytes())),
            message: Some(Bytes::copy_from_slice(inner().serialized())),
            registration_id: Some(1),
            signed_pre_key_id: None,
        };
        let mut bytes = vec![MessageVersion::V3.version_byte()];
        bytes.extend_from_slice(&body.encode_to_vec());

        assert_eq!(
            PreKeySignalMessage::from_bytes(&bytes).unwrap_err(),
            ProtocolError::MissingField { field: "signed_pre_key_id" }
        );
    }

    #[test]
    fn rejects_untagged_base_key() {
        let body = wire::PreKeySignalMessage {
            pre_key_id: None,
            base_key: Some(Bytes::copy_from_slice(key(0x44).point())),
            identity_key: Some(Bytes::copy_from_slice(&key(0x22).to_bytes())),
            message: Some(Bytes::copy_from_slice(inner().serialized())),
            registration_id: Some(1),
            signed_pre_key_id: Some(3),
        };
        let mut bytes = vec![MessageVersion::V3.version_byte()];
        bytes.extend_from_slice(&body.encode_to_vec());

        assert!(matches!(
            PreKeySignalMessage::from_bytes(&bytes),
            Err(ProtocolError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_future_version() {
        let message =
            PreKeySignalMessage::new(MessageVersion::V3, 1, None, 3, key(0x44), key(0x22), inner());
        let mut bytes = message.serialized().to_vec();
        bytes[0] = 0x43;

        assert_eq!(
            PreKeySignalMessage::from_bytes(&bytes).unwrap_err(),
            ProtocolError::UnsupportedVersion { version: 4 }
        );
    }
}
