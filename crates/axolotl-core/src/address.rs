//! Remote party naming
//!
//! Sessions are keyed by an [`Address`] (a name plus a device id) and
//! sender keys by a [`GroupAddress`]. The traits let applications bring their
//! own identifier types; [`ProtocolAddress`] and [`SenderKeyName`] are the
//! stock implementations.

use std::{fmt, hash::Hash};

use serde::{Deserialize, Serialize};

/// Identifies one device of a remote party.
pub trait Address: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Account-level name shared by all of a party's devices.
    fn name(&self) -> &str;

    /// Device id within `name`.
    fn device_id(&self) -> u32;
}

/// Identifies one sender within one group.
pub trait GroupAddress: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// `name.device_id` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolAddress {
    name: String,
    device_id: u32,
}

impl ProtocolAddress {
    /// Create an address.
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self { name: name.into(), device_id }
    }
}

impl Address for ProtocolAddress {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// A sender's key within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    /// Create a sender key name.
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self { group_id: group_id.into(), sender }
    }

    /// Group identifier.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Sending device.
    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl GroupAddress for SenderKeyName {}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group_id, self.sender)
    }
}
