//! Sender-key group messaging
//!
//! Each sender owns one chain per group and announces it to members through
//! a [`SenderKeyDistributionMessage`](axolotl_proto::SenderKeyDistributionMessage)
//! sent over pairwise sessions. Members then decrypt that sender's group
//! messages without further round trips. Messages are signed, so members
//! cannot forge each other's traffic even though they share the chain.

mod cipher;
mod state;

pub use cipher::GroupCipher;
pub use state::{SenderKeyRecord, SenderKeyState};
