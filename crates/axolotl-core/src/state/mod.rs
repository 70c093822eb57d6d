//! Persisted protocol state
//!
//! Records are plain serde types. Stores persist them as CBOR via
//! [`SessionRecord::to_bytes`](record::SessionRecord::to_bytes) and friends;
//! decoding re-validates every embedded key.

mod chain;
mod prekey;
mod record;
mod session;

pub use chain::{ReceiverChain, SenderChain};
pub use prekey::{PreKeyBundle, PreKeyRecord, SignedPreKeyRecord};
pub use record::SessionRecord;
pub use session::{PendingPreKey, SessionState};
use serde::{Serialize, de::DeserializeOwned};

use crate::storage::StorageError;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::de::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
