//! Wire message combining an encoded header and its ciphertext.
//!
//! Layout on the wire (Big Endian):
//!
//! ```text
//! [magic: 4]["DUET"] [version: 1] [header_len: 2] [ciphertext_len: 4]
//! [header: header_len] [ciphertext: ciphertext_len]
//! ```

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::{MAX_HEADER_SIZE, MessageHeader},
};

/// Magic number: "DUET" in ASCII
pub const MAGIC: u32 = 0x4455_4554;

/// Current wire version
pub const VERSION: u8 = 0x01;

/// Size of the fixed prefix (magic, version, two lengths)
pub const PREFIX_SIZE: usize = 4 + 1 + 2 + 4;

/// Maximum ciphertext size (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One ratchet message as carried by a transport
///
/// Holds the header as its exact encoded bytes, which are the AEAD
/// associated data. The header is never re-serialized between sender and
/// receiver.
///
/// # Invariants
///
/// - `header.len() <= MAX_HEADER_SIZE`, checked on encode and decode
/// - `ciphertext.len() <= MAX_MESSAGE_SIZE`, checked on encode and decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Encoded [`MessageHeader`]
    pub header: Bytes,

    /// AEAD ciphertext including the 16-byte tag
    pub ciphertext: Bytes,
}

impl WireMessage {
    /// Create a wire message from already-encoded parts.
    pub fn new(header: impl Into<Bytes>, ciphertext: impl Into<Bytes>) -> Self {
        Self { header: header.into(), ciphertext: ciphertext.into() }
    }

    /// Parse the header bytes.
    ///
    /// # Errors
    ///
    /// - Any error from [`MessageHeader::decode`]
    pub fn decode_header(&self) -> Result<MessageHeader> {
        MessageHeader::decode(&self.header)
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        PREFIX_SIZE + self.header.len() + self.ciphertext.len()
    }

    /// Write the framed message into `dst`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::TooLarge` if the header or ciphertext exceed their
    ///   limits
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let (header_len, ciphertext_len) = self.checked_lengths()?;

        dst.put_u32(MAGIC);
        dst.put_u8(VERSION);
        dst.put_u16(header_len);
        dst.put_u32(ciphertext_len);
        dst.put_slice(&self.header);
        dst.put_slice(&self.ciphertext);

        Ok(())
    }

    /// Parse a framed message.
    ///
    /// Only validates framing. The header is not parsed and the ciphertext is
    /// not authenticated. The input must hold exactly one message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if the input is shorter than the prefix
    ///   or than the lengths it declares
    /// - `ProtocolError::InvalidMagic` / `UnsupportedVersion` on a foreign
    ///   or newer format
    /// - `ProtocolError::TooLarge` if a declared length exceeds its limit
    /// - `ProtocolError::TrailingBytes` if input continues past the
    ///   ciphertext
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some(prefix) = bytes.get(..PREFIX_SIZE) else {
            return Err(ProtocolError::Truncated { expected: PREFIX_SIZE, actual: bytes.len() });
        };

        let magic = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }
        if prefix[4] != VERSION {
            return Err(ProtocolError::UnsupportedVersion(prefix[4]));
        }

        let header_len = u16::from_be_bytes([prefix[5], prefix[6]]) as usize;
        let ciphertext_len =
            u32::from_be_bytes([prefix[7], prefix[8], prefix[9], prefix[10]]) as usize;

        if header_len > MAX_HEADER_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "header",
                size: header_len,
                max: MAX_HEADER_SIZE,
            });
        }
        if ciphertext_len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "ciphertext",
                size: ciphertext_len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let header_end = PREFIX_SIZE + header_len;
        let total = header_end + ciphertext_len;
        let (Some(header), Some(ciphertext)) =
            (bytes.get(PREFIX_SIZE..header_end), bytes.get(header_end..total))
        else {
            return Err(ProtocolError::Truncated { expected: total, actual: bytes.len() });
        };
        if bytes.len() != total {
            return Err(ProtocolError::TrailingBytes { expected: total, actual: bytes.len() });
        }

        Ok(Self::new(Bytes::copy_from_slice(header), Bytes::copy_from_slice(ciphertext)))
    }

    fn checked_lengths(&self) -> Result<(u16, u32)> {
        if self.header.len() > MAX_HEADER_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "header",
                size: self.header.len(),
                max: MAX_HEADER_SIZE,
            });
        }
        if self.ciphertext.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "ciphertext",
                size: self.ciphertext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        // Both limits are far below the width of their length prefixes.
        Ok((self.header.len() as u16, self.ciphertext.len() as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let msg = WireMessage::new(vec![1, 2, 3], vec![4, 5, 6, 7]);

        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();

        assert_eq!(buf.len(), msg.encoded_len());
        assert_eq!(WireMessage::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn truncated_prefix_rejected() {
        assert!(matches!(WireMessage::decode(&[0x44, 0x55]), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn truncated_body_rejected() {
        let mut buf = Vec::new();
        WireMessage::new(vec![1; 10], vec![2; 10]).encode(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        assert!(matches!(WireMessage::decode(&buf), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut buf = Vec::new();
        WireMessage::new(vec![1, 2, 3], vec![4, 5]).encode(&mut buf).unwrap();
        buf.extend_from_slice(b"junk");

        assert_eq!(
            WireMessage::decode(&buf),
            Err(ProtocolError::TrailingBytes { expected: 16, actual: 20 })
        );
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = Vec::new();
        WireMessage::new(vec![1], vec![2]).encode(&mut buf).unwrap();
        buf[0] = b'X';

        assert!(matches!(WireMessage::decode(&buf), Err(ProtocolError::InvalidMagic(_))));
    }

    #[test]
    fn future_version_rejected() {
        let mut buf = Vec::new();
        WireMessage::new(vec![1], vec![2]).encode(&mut buf).unwrap();
        buf[4] = 0x02;

        assert_eq!(WireMessage::decode(&buf), Err(ProtocolError::UnsupportedVersion(2)));
    }

    #[test]
    fn oversized_header_rejected() {
        let msg = WireMessage::new(vec![0; MAX_HEADER_SIZE + 1], vec![]);
        assert!(matches!(
            msg.encode(&mut Vec::new()),
            Err(ProtocolError::TooLarge { what: "header", .. })
        ));
    }

    #[test]
    fn declared_length_over_limit_rejected() {
        let mut buf = Vec::new();
        buf.put_u32(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u16(0);
        buf.put_u32(u32::MAX);

        assert!(matches!(
            WireMessage::decode(&buf),
            Err(ProtocolError::TooLarge { what: "ciphertext", .. })
        ));
    }
}
