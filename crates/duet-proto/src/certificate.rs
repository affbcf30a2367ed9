//! Identity certificates issued by the certificate authority.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Maximum encoded certificate size (4 KiB)
pub const MAX_CERTIFICATE_SIZE: usize = 4096;

/// Binding of a username to an identity public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Certificate {
    /// Unique user name
    pub username: String,

    /// Identity public key (SEC1 compressed P-384 point)
    pub public_key: Vec<u8>,
}

impl Certificate {
    /// Create a certificate.
    pub fn new(username: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self { username: username.into(), public_key }
    }

    /// The byte string the authority signs.
    ///
    /// CBOR of `{username, public_key}` in that order. Signer and verifier
    /// both call this, so they always agree on the signed bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }
}

/// A certificate with the authority's detached signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedCertificate {
    /// The signed binding
    pub certificate: Certificate,

    /// ECDSA signature over [`Certificate::canonical_bytes`]
    pub signature: Vec<u8>,
}

impl SignedCertificate {
    /// Encode for distribution to other clients.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a distributed certificate.
    ///
    /// Decoding says nothing about validity: the signature still has to be
    /// checked against the authority key.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::TooLarge` if `bytes` exceed [`MAX_CERTIFICATE_SIZE`]
    /// - `ProtocolError::CborDecode` if the bytes are not a signed certificate
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_CERTIFICATE_SIZE {
            return Err(ProtocolError::TooLarge {
                what: "certificate",
                size: bytes.len(),
                max: MAX_CERTIFICATE_SIZE,
            });
        }

        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}
