//! Protocol error types

use thiserror::Error;

/// Result alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding or decoding wire structures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// CBOR serialization failed
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),

    /// Input exceeds the size limit for its structure
    #[error("{what} too large: {size} bytes (max {max})")]
    TooLarge {
        /// Which structure was oversized
        what: &'static str,
        /// Actual size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Decoded header does not re-encode to the exact input bytes
    #[error("header is not in canonical encoding")]
    NonCanonical,

    /// Wire message does not start with the expected magic bytes
    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Wire message version is not supported
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Wire message is shorter than its length prefixes claim
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the prefixes claim
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Wire message has bytes past the lengths its prefixes declare
    #[error("trailing bytes: expected {expected} bytes, got {actual}")]
    TrailingBytes {
        /// Bytes the prefixes claim
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },
}
