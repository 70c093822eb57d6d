//! Fuzz target for the wire parsers
//!
//! Feeds arbitrary bytes to the framing layer and to every message parser.
//! Parsing must never panic; invalid input returns an error.

#![no_main]

use axolotl_proto::{
    CiphertextMessage, PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage,
    SignalMessage,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = SignalMessage::from_bytes(data);
    let _ = PreKeySignalMessage::from_bytes(data);
    let _ = SenderKeyMessage::from_bytes(data);
    let _ = SenderKeyDistributionMessage::from_bytes(data);

    // Anything that parses must frame back to the same bytes.
    if let Ok(message) = CiphertextMessage::from_framed(data) {
        assert_eq!(message.to_framed(), data, "framing must be lossless");
    }
});
