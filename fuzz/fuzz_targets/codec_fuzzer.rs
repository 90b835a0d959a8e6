//! Fuzz target for the message codec
//!
//! # Invariants
//!
//! - Decoding arbitrary bytes NEVER panics
//! - Anything that decodes re-encodes and decodes to the same messages

#![no_main]

use libfuzzer_sys::fuzz_target;
use tandem_proto::{decode_messages, encode_messages};

fuzz_target!(|data: &[u8]| {
    let Ok(messages) = decode_messages(data) else {
        return;
    };

    let encoded = encode_messages(&messages).expect("decoded messages must re-encode");
    let decoded = decode_messages(&encoded).expect("re-encoded messages must decode");
    assert_eq!(decoded, messages);
});
