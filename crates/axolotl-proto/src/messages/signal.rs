//! `SignalMessage`: one Double Ratchet message
//!
//! Layout: `[version byte] + [protobuf body] + [MAC: 8 bytes]`.

use axolotl_crypto::{PublicKey, constant_time_eq, hmac_sha256};
use bytes::Bytes;
use prost::Message;

use crate::{
    errors::{ProtocolError, Result},
    version::MessageVersion,
    wire,
};

/// Length of the truncated HMAC-SHA256 appended to every `SignalMessage`
pub const MAC_LENGTH: usize = 8;

/// Keys binding a MAC to both parties.
///
/// `sender_identity` is always the identity of the party that produced the
/// message, so the receiver passes the remote identity first.
#[derive(Debug, Clone, Copy)]
pub struct MacContext<'a> {
    /// Identity key of the message author
    pub sender_identity: &'a PublicKey,
    /// Identity key of the message recipient
    pub receiver_identity: &'a PublicKey,
    /// MAC key from the message keys
    pub mac_key: &'a [u8; 32],
}

/// A parsed or freshly built Double Ratchet message.
///
/// # Invariants
///
/// - `serialized` is exactly the bytes that were parsed or produced,
///   including version byte and MAC
/// - The other fields are the decoded view of `serialized`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    message_version: MessageVersion,
    sender_ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Bytes,
    serialized: Bytes,
}

impl SignalMessage {
    /// Build and MAC a message.
    pub fn new(
        message_version: MessageVersion,
        sender_ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Bytes,
        mac: &MacContext<'_>,
    ) -> Self {
        let body = wire::SignalMessage {
            ratchet_key: Some(Bytes::copy_from_slice(&sender_ratchet_key.to_bytes())),
            counter: Some(counter),
            previous_counter: Some(previous_counter),
            ciphertext: Some(ciphertext.clone()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + MAC_LENGTH);
        serialized.push(message_version.version_byte());
        serialized.extend_from_slice(&body.encode_to_vec());
        let tag = compute_mac(message_version, mac, &serialized);
        serialized.extend_from_slice(&tag);

        Self {
            message_version,
            sender_ratchet_key,
            counter,
            previous_counter,
            ciphertext,
            serialized: serialized.into(),
        }
    }

    /// Parse a serialized message. Does not verify the MAC.
    ///
    /// # Errors
    ///
    /// - `MessageTooShort` if there is no room for version byte and MAC
    /// - `LegacyVersion` / `UnsupportedVersion` from the version byte
    /// - `Decode` / `MissingField` / `InvalidKey` for a malformed body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let minimum = 1 + MAC_LENGTH + 1;
        if bytes.len() < minimum {
            return Err(ProtocolError::MessageTooShort { actual: bytes.len(), minimum });
        }

        let message_version = MessageVersion::from_version_byte(bytes[0])?;
        let body = wire::SignalMessage::decode(&bytes[1..bytes.len() - MAC_LENGTH])?;

        let ratchet_key = body.ratchet_key.ok_or(ProtocolError::MissingField { field: "ratchet_key" })?;
        let counter = body.counter.ok_or(ProtocolError::MissingField { field: "counter" })?;
        let previous_counter = body.previous_counter.unwrap_or(0);
        let ciphertext = body.ciphertext.ok_or(ProtocolError::MissingField { field: "ciphertext" })?;

        Ok(Self {
            message_version,
            sender_ratchet_key: PublicKey::from_bytes(&ratchet_key)?,
            counter,
            previous_counter,
            ciphertext,
            serialized: Bytes::copy_from_slice(bytes),
        })
    }

    /// Version the message was sent with.
    pub fn message_version(&self) -> MessageVersion {
        self.message_version
    }

    /// Sender's ratchet public key.
    pub fn sender_ratchet_key(&self) -> &PublicKey {
        &self.sender_ratchet_key
    }

    /// Index in the sender chain.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Length of the sender's previous chain.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// Encrypted payload.
    pub fn body(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Full wire encoding.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Check the trailing MAC in constant time.
    pub fn verify_mac(&self, mac: &MacContext<'_>) -> bool {
        let split = self.serialized.len() - MAC_LENGTH;
        let expected = compute_mac(self.message_version, mac, &self.serialized[..split]);
        constant_time_eq(&expected, &self.serialized[split..])
    }
}

impl TryFrom<&[u8]> for SignalMessage {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

/// Truncated HMAC-SHA256 over `[identities] + version byte + body`.
fn compute_mac(version: MessageVersion, mac: &MacContext<'_>, message: &[u8]) -> [u8; MAC_LENGTH] {
    let full = match version {
        MessageVersion::V3 => {
            let sender = mac.sender_identity.to_bytes();
            let receiver = mac.receiver_identity.to_bytes();
            hmac_sha256(mac.mac_key, &[&sender[..], &receiver[..], message])
        },
        MessageVersion::V2 => hmac_sha256(mac.mac_key, &[message]),
    };

    let mut out = [0u8; MAC_LENGTH];
    out.copy_from_slice(&full[..MAC_LENGTH]);
    out
}
