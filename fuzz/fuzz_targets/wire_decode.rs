//! Fuzz target for `WireMessage::decode` and header decoding
//!
//! Arbitrary bytes through both wire decoders. Neither may panic, and
//! anything that decodes must re-encode to the exact input bytes.

#![no_main]

use duet_proto::{MessageHeader, WireMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = WireMessage::decode(data) {
        let mut encoded = Vec::new();
        message.encode(&mut encoded).expect("decoded message must re-encode");
        assert_eq!(encoded, data, "wire framing is not canonical");
        let _ = message.decode_header();
    }

    if let Ok(header) = MessageHeader::decode(data) {
        let encoded = header.encode().expect("decoded header must re-encode");
        assert_eq!(encoded, data, "accepted a non-canonical header");
    }
});
