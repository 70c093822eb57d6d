//! Protocol bounds
//!
//! Every limit here protects memory or CPU against a peer that sends
//! absurd counters. None of them is negotiated; both sides must agree.

/// Largest counter jump a single incoming message may request.
///
/// Applies to both pairwise chains and sender-key chains.
pub const MAX_FORWARD_JUMPS: u32 = 2000;

/// Skipped message keys kept per receiver chain (and per sender-key state).
/// The oldest key is evicted first.
pub const MAX_MESSAGE_KEYS: usize = 2000;

/// Receiver chains kept per session state.
pub const MAX_RECEIVER_CHAINS: usize = 5;

/// Archived session states kept per remote address.
pub const ARCHIVED_STATES_MAX: usize = 40;

/// Sender-key states kept per sender key name.
pub const MAX_SENDER_KEY_STATES: usize = 5;

/// Device id of the primary device for a name.
pub const DEFAULT_DEVICE_ID: u32 = 1;

/// One-time prekey ids wrap within `1..MEDIUM_MAX_VALUE`.
pub const MEDIUM_MAX_VALUE: u32 = 0x00FF_FFFF;

/// Registration ids are drawn from `1..=MAX_REGISTRATION_ID`.
pub const MAX_REGISTRATION_ID: u32 = 16380;
