//! Ratchet message header.
//!
//! The header travels in the clear next to the ciphertext. Its exact encoded
//! bytes are the AEAD associated data of the message, so the encoding must be
//! reproducible: a receiver authenticates the bytes it was given, never a
//! re-serialization of them.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Size of an `XChaCha20` IV (24 bytes)
pub const IV_SIZE: usize = 24;

/// Maximum encoded header size (4 KiB)
///
/// A header carries two public keys, a wrapped key and two IVs; anything
/// larger is malformed.
pub const MAX_HEADER_SIZE: usize = 4096;

/// Key escrow side channel carried in every header when escrow is enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscrowFields {
    /// Ephemeral public key for this message's escrow DH (SEC1 compressed)
    pub ephemeral_public_key: Vec<u8>,

    /// Message key sealed to the escrow holder, including tag
    pub ciphertext: Vec<u8>,

    /// IV of the escrow AEAD
    pub iv: [u8; IV_SIZE],
}

/// Header of a ratchet message
///
/// # Invariants
///
/// - Canonical Form: [`MessageHeader::decode`] only accepts bytes that
///   [`MessageHeader::encode`] would have produced for the decoded value.
///   Two distinct byte strings never decode to the same header.
///
/// # Security
///
/// The header is authenticated but not encrypted. The ratchet public key and
/// counters are visible to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageHeader {
    /// Sender's current ratchet public key (SEC1 compressed)
    pub ratchet_public_key: Vec<u8>,

    /// Index of this message in the sender's current chain
    pub message_index: u32,

    /// Length of the sender's previous sending chain
    pub previous_chain_length: u32,

    /// Escrowed message key, absent when escrow is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow: Option<EscrowFields>,

    /// IV of the message AEAD
    pub message_iv: [u8; IV_SIZE],
}

impl MessageHeader {
    /// Encode to CBOR.
    ///
    /// Field order is fixed by the struct definition, so the same header
    /// always produces the same bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::TooLarge` if the encoding exceeds [`MAX_HEADER_SIZE`]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

        if buf.len() > MAX_HEADER_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "header",
                size: buf.len(),
                max: MAX_HEADER_SIZE,
            });
        }

        Ok(buf)
    }

    /// Decode from CBOR, rejecting anything but the canonical encoding.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::TooLarge` if `bytes` exceed [`MAX_HEADER_SIZE`]
    ///   (checked before parsing)
    /// - `ProtocolError::CborDecode` if the bytes are not a header
    /// - `ProtocolError::NonCanonical` if the bytes are a header in any
    ///   encoding other than the canonical one, or carry trailing data
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_HEADER_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "header",
                size: bytes.len(),
                max: MAX_HEADER_SIZE,
            });
        }

        let header: Self = ciborium::de::from_reader(bytes)
            .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;

        if header.encode()? != bytes {
            return Err(ProtocolError::NonCanonical);
        }

        Ok(header)
    }
}
