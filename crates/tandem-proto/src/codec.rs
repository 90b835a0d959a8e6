//! CBOR encoding of message snapshots.
//!
//! The simulated transport moves typed values, so nothing on the delivery
//! path is encoded. The codec exists for dumping a queue snapshot (and for
//! loading one back in tests and fuzzing).

use crate::{error::ProtoError, message::Message};

/// Encode a sequence of messages as one CBOR array.
pub fn encode_messages(messages: &[Message]) -> Result<Vec<u8>, ProtoError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(messages, &mut buf).map_err(|e| ProtoError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR array of messages.
pub fn decode_messages(bytes: &[u8]) -> Result<Vec<Message>, ProtoError> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtoError::Decode(e.to_string()))
}
