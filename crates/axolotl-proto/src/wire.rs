//! Protobuf bodies of the wire messages
//!
//! Field numbers are the interoperable contract. All fields are proto2
//! `optional`; presence of required fields is checked by the typed message
//! wrappers in [`crate::messages`].

use bytes::Bytes;

/// Body of a `SignalMessage`, followed on the wire by an 8-byte MAC
#[derive(Clone, PartialEq, prost::Message)]
pub struct SignalMessage {
    /// Sender's current ratchet public key (33-byte encoding)
    #[prost(bytes = "bytes", optional, tag = "1")]
    pub ratchet_key: Option<Bytes>,
    /// Index in the sender chain
    #[prost(uint32, optional, tag = "2")]
    pub counter: Option<u32>,
    /// Length of the sender's previous chain
    #[prost(uint32, optional, tag = "3")]
    pub previous_counter: Option<u32>,
    /// AES-256-CBC ciphertext
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub ciphertext: Option<Bytes>,
}

/// Body of a `PreKeySignalMessage`
#[derive(Clone, PartialEq, prost::Message)]
pub struct PreKeySignalMessage {
    /// One-time prekey consumed by the handshake, if any
    #[prost(uint32, optional, tag = "1")]
    pub pre_key_id: Option<u32>,
    /// Initiator's base key (33-byte encoding)
    #[prost(bytes = "bytes", optional, tag = "2")]
    pub base_key: Option<Bytes>,
    /// Initiator's identity key (33-byte encoding)
    #[prost(bytes = "bytes", optional, tag = "3")]
    pub identity_key: Option<Bytes>,
    /// Serialized inner `SignalMessage` including its version byte and MAC
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub message: Option<Bytes>,
    /// Initiator's registration id
    #[prost(uint32, optional, tag = "5")]
    pub registration_id: Option<u32>,
    /// Signed prekey used by the handshake
    #[prost(uint32, optional, tag = "6")]
    pub signed_pre_key_id: Option<u32>,
}

/// Body of a `SenderKeyMessage`, followed on the wire by a 64-byte signature
#[derive(Clone, PartialEq, prost::Message)]
pub struct SenderKeyMessage {
    /// Sender key id
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    /// Iteration of the sender chain
    #[prost(uint32, optional, tag = "2")]
    pub iteration: Option<u32>,
    /// AES-256-CBC ciphertext
    #[prost(bytes = "bytes", optional, tag = "3")]
    pub ciphertext: Option<Bytes>,
}

/// Body of a `SenderKeyDistributionMessage`
#[derive(Clone, PartialEq, prost::Message)]
pub struct SenderKeyDistributionMessage {
    /// Sender key id
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    /// Iteration the chain key corresponds to
    #[prost(uint32, optional, tag = "2")]
    pub iteration: Option<u32>,
    /// 32-byte chain key seed
    #[prost(bytes = "bytes", optional, tag = "3")]
    pub chain_key: Option<Bytes>,
    /// Signing public key (33-byte encoding)
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub signing_key: Option<Bytes>,
}
