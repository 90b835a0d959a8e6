//! Protocol error types.

use thiserror::Error;

/// Errors from encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// CBOR serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),
}
