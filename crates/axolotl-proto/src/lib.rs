//! Axolotl wire protocol
//!
//! Parsing and construction of the four wire messages plus the one-byte
//! message-type framing used by transports.
//!
//! # Layout
//!
//! ```text
//! SignalMessage:               [ver] [protobuf] [MAC: 8]
//! PreKeySignalMessage:         [ver] [protobuf (wraps a SignalMessage)]
//! SenderKeyMessage:            [ver] [protobuf] [signature: 64]
//! SenderKeyDistributionMessage [ver] [protobuf]
//!
//! ver = (message_version << 4) | CURRENT_VERSION
//! ```
//!
//! Parsers are strict: version nibbles outside 2..=3 are rejected, required
//! protobuf fields must be present, and embedded public keys must use the
//! 33-byte tagged encoding. Parsing never verifies MACs or signatures; the
//! session and group ciphers do that once they hold the keys.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod messages;
pub mod version;
pub mod wire;

pub use errors::{ProtocolError, Result};
pub use messages::{
    CiphertextMessage, CiphertextMessageType, MAC_LENGTH, MacContext, PreKeySignalMessage,
    SenderKeyDistributionMessage, SenderKeyMessage, SignalMessage,
};
pub use version::{CURRENT_VERSION, MessageVersion};
