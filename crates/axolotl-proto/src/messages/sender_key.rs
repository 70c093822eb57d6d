//! Group messages: `SenderKeyMessage` and `SenderKeyDistributionMessage`
//!
//! Sender keys were introduced with version 3, so both messages reject
//! anything older as legacy.
//!
//! `SenderKeyMessage` layout:
//! `[version byte] + [protobuf body] + [XEdDSA signature: 64 bytes]`,
//! where the signature covers version byte and body.
//!
//! `SenderKeyDistributionMessage` layout: `[version byte] + [protobuf body]`.

use axolotl_crypto::{PrivateKey, PublicKey, SIGNATURE_LENGTH};
use bytes::Bytes;
use prost::Message;
use rand::{CryptoRng, RngCore};

use crate::{
    errors::{ProtocolError, Result},
    version::MessageVersion,
    wire,
};

fn sender_key_version(byte: u8) -> Result<MessageVersion> {
    let version = MessageVersion::from_version_byte(byte)?;
    if version < MessageVersion::V3 {
        return Err(ProtocolError::LegacyVersion { version: version.as_u8() });
    }
    Ok(version)
}

/// Signed group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyMessage {
    message_version: MessageVersion,
    key_id: u32,
    iteration: u32,
    ciphertext: Bytes,
    serialized: Bytes,
}

impl SenderKeyMessage {
    /// Build and sign a group message.
    pub fn new<R: RngCore + CryptoRng>(
        key_id: u32,
        iteration: u32,
        ciphertext: Bytes,
        signing_key: &PrivateKey,
        rng: &mut R,
    ) -> Self {
        let message_version = MessageVersion::CURRENT;
        let body = wire::SenderKeyMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            ciphertext: Some(ciphertext.clone()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + SIGNATURE_LENGTH);
        serialized.push(message_version.version_byte());
        serialized.extend_from_slice(&body.encode_to_vec());
        let signature = signing_key.calculate_signature(&serialized, rng);
        serialized.extend_from_slice(&signature);

        Self { message_version, key_id, iteration, ciphertext, serialized: serialized.into() }
    }

    /// Parse a serialized message. Does not verify the signature.
    ///
    /// # Errors
    ///
    /// - `MessageTooShort` if there is no room for version byte and signature
    /// - `LegacyVersion` for anything below version 3
    /// - `Decode` / `MissingField` for a malformed body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let minimum = 1 + SIGNATURE_LENGTH;
        if bytes.len() < minimum {
            return Err(ProtocolError::MessageTooShort { actual: bytes.len(), minimum });
        }

        let message_version = sender_key_version(bytes[0])?;
        let body = wire::SenderKeyMessage::decode(&bytes[1..bytes.len() - SIGNATURE_LENGTH])?;

        Ok(Self {
            message_version,
            key_id: body.id.ok_or(ProtocolError::MissingField { field: "id" })?,
            iteration: body.iteration.ok_or(ProtocolError::MissingField { field: "iteration" })?,
            ciphertext: body.ciphertext.ok_or(ProtocolError::MissingField { field: "ciphertext" })?,
            serialized: Bytes::copy_from_slice(bytes),
        })
    }

    /// Check the trailing signature against the sender's signing key.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the signature is structurally invalid
    pub fn verify_signature(&self, signing_key: &PublicKey) -> Result<bool> {
        let split = self.serialized.len() - SIGNATURE_LENGTH;
        signing_key
            .verify_signature(&self.serialized[..split], &self.serialized[split..])
            .map_err(ProtocolError::from)
    }

    /// Version the message was sent with.
    pub fn message_version(&self) -> MessageVersion {
        self.message_version
    }

    /// Sender key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Iteration of the sender chain.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Encrypted payload.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Full wire encoding.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for SenderKeyMessage {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

/// Announcement of a sender's chain key and signing key to group members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyDistributionMessage {
    message_version: MessageVersion,
    key_id: u32,
    iteration: u32,
    chain_key: [u8; 32],
    signing_key: PublicKey,
    serialized: Bytes,
}

impl SenderKeyDistributionMessage {
    /// Build a distribution message.
    pub fn new(key_id: u32, iteration: u32, chain_key: [u8; 32], signing_key: PublicKey) -> Self {
        let message_version = MessageVersion::CURRENT;
        let body = wire::SenderKeyDistributionMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            chain_key: Some(Bytes::copy_from_slice(&chain_key)),
            signing_key: Some(Bytes::copy_from_slice(&signing_key.to_bytes())),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push(message_version.version_byte());
        serialized.extend_from_slice(&body.encode_to_vec());

        Self { message_version, key_id, iteration, chain_key, signing_key, serialized: serialized.into() }
    }

    /// Parse a serialized distribution message.
    ///
    /// # Errors
    ///
    /// - `MessageTooShort` for empty input
    /// - `LegacyVersion` for anything below version 3
    /// - `Decode` / `MissingField` / `InvalidField` / `InvalidKey` for a
    ///   malformed body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((&version_byte, rest)) = bytes.split_first() else {
            return Err(ProtocolError::MessageTooShort { actual: 0, minimum: 1 });
        };

        let message_version = sender_key_version(version_byte)?;
        let body = wire::SenderKeyDistributionMessage::decode(rest)?;

        let chain_key = body.chain_key.ok_or(ProtocolError::MissingField { field: "chain_key" })?;
        let Ok(chain_key) = <[u8; 32]>::try_from(chain_key.as_ref()) else {
            return Err(ProtocolError::InvalidField {
                field: "chain_key",
                reason: format!("expected 32 bytes, got {}", chain_key.len()),
            });
        };
        let signing_key =
            body.signing_key.ok_or(ProtocolError::MissingField { field: "signing_key" })?;

        Ok(Self {
            message_version,
            key_id: body.id.ok_or(ProtocolError::MissingField { field: "id" })?,
            iteration: body.iteration.ok_or(ProtocolError::MissingField { field: "iteration" })?,
            chain_key,
            signing_key: PublicKey::from_bytes(&signing_key)?,
            serialized: Bytes::copy_from_slice(bytes),
        })
    }

    /// Version the message was sent with.
    pub fn message_version(&self) -> MessageVersion {
        self.message_version
    }

    /// Sender key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Iteration `chain_key` corresponds to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Chain key seed at `iteration`.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Sender's signing public key.
    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }

    /// Full wire encoding.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl TryFrom<&[u8]> for SenderKeyDistributionMessage {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use axolotl_crypto::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn sender_key_message_signature_verifies() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let signing = KeyPair::generate(&mut rng);

        let message =
            SenderKeyMessage::new(9, 4, Bytes::from_static(b"group"), &signing.private_key, &mut rng);
        let parsed = SenderKeyMessage::from_bytes(message.serialized()).unwrap();

        assert_eq!(parsed, message);
        assert_eq!(parsed.key_id(), 9);
        assert_eq!(parsed.iteration(), 4);
        assert_eq!(parsed.ciphertext(), b"group");
        assert!(parsed.verify_signature(&signing.public_key).unwrap());
    }

    #[test]
    fn sender_key_message_rejects_other_signer() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let signing = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);

        let message =
            SenderKeyMessage::new(9, 4, Bytes::from_static(b"group"), &signing.private_key, &mut rng);
        assert!(!message.verify_signature(&other.public_key).unwrap());
    }

    #[test]
    fn sender_key_message_signature_covers_header() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let signing = KeyPair::generate(&mut rng);

        let message =
            SenderKeyMessage::new(9, 4, Bytes::from_static(b"group"), &signing.private_key, &mut rng);
        let mut bytes = message.serialized().to_vec();
        // iteration varint
        bytes[4] ^= 0x01;

        let parsed = SenderKeyMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.iteration(), 5);
        assert!(!parsed.verify_signature(&signing.public_key).unwrap());
    }

    #[test]
    fn sender_key_message_rejects_version_two() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let signing = KeyPair::generate(&mut rng);

        let message =
            SenderKeyMessage::new(9, 4, Bytes::from_static(b"group"), &signing.private_key, &mut rng);
        let mut bytes = message.serialized().to_vec();
        bytes[0] = 0x23;

        assert_eq!(
            SenderKeyMessage::from_bytes(&bytes).unwrap_err(),
            ProtocolError::LegacyVersion { version: 2 }
        );
    }

    #[test]
    fn distribution_message_roundtrip_fields() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let signing = KeyPair::generate(&mut rng);

        let message = SenderKeyDistributionMessage::new(77, 100, [0x5A; 32], signing.public_key);
        let parsed = SenderKeyDistributionMessage::from_bytes(message.serialized()).unwrap();

        assert_eq!(parsed, message);
        assert_eq!(parsed.key_id(), 77);
        assert_eq!(parsed.iteration(), 100);
        assert_eq!(parsed.chain_key(), &[0x5A; 32]);
        assert_eq!(parsed.signing_key(), &signing.public_key);
    }

    #[test]
    fn distribution_message_rejects_short_chain_key() {
        let body = wire::SenderKeyDistributionMessage {
            id: Some(1),
            iteration: Some(0),
            chain_key: Some(Bytes::from_static(&[1u8; 16])),
            signing_key: Some(Bytes::copy_from_slice(&PublicKey::from_point([9; 32]).to_bytes())),
        };
        let mut bytes = vec![MessageVersion::V3.version_byte()];
        bytes.extend_from_slice(&body.encode_to_vec());

        assert_eq!(
            SenderKeyDistributionMessage::from_bytes(&bytes).unwrap_err(),
            ProtocolError::InvalidField {
                field: "chain_key",
                reason: "expected 32 bytes, got 16".to_string(),
            }
        );
    }
}
