//! Duet wire protocol
//!
//! Wire types for the duet pairwise ratchet: message headers, the framed wire
//! message and identity certificates.
//!
//! Headers and certificates are CBOR. We use CBOR because it is compact,
//! self-describing and needs no code generation. The wire message wrapping a
//! header and its ciphertext is raw binary framing, so a transport can split a
//! message without a CBOR parser.
//!
//! # Invariants
//!
//! Header decoding is strict: only the canonical encoding of a header is
//! accepted. The header bytes are authenticated as AEAD associated data, and
//! strict decoding keeps "the bytes that were authenticated" and "the values
//! the receiver acts on" in one-to-one correspondence.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificate;
pub mod errors;
pub mod header;
pub mod message;

pub use certificate::{Certificate, MAX_CERTIFICATE_SIZE, SignedCertificate};
pub use errors::{ProtocolError, Result};
pub use header::{EscrowFields, IV_SIZE, MAX_HEADER_SIZE, MessageHeader};
pub use message::{MAX_MESSAGE_SIZE, WireMessage};
