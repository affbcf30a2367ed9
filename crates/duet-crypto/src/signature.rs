//! Certificate authority signatures (ECDSA P-384 with SHA-384).
//!
//! Clients only ever hold an [`AuthorityPublicKey`]. The signing half models
//! the external certificate authority for tests and operator tooling.

use std::fmt;

use p384::ecdsa::{
    Signature, SigningKey, VerifyingKey,
    signature::{Signer, Verifier},
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Fixed-size `r || s` signature encoding (96 bytes)
pub const SIGNATURE_SIZE: usize = 96;

/// Trusted verification key of the certificate authority.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuthorityPublicKey(VerifyingKey);

impl AuthorityPublicKey {
    /// Parse a SEC1 encoded verification key.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey` if the bytes are not a point on P-384
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes).map(Self).map_err(|_| {
            CryptoError::InvalidPublicKey {
                reason: format!("{} bytes do not encode a P-384 verifying key", bytes.len()),
            }
        })
    }

    /// SEC1 compressed encoding (49 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Check `signature` over `message`.
    ///
    /// Malformed signature bytes verify as `false`; this never panics on
    /// attacker-controlled input.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for AuthorityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "AuthorityPublicKey({:02x}{:02x}{:02x}..)", bytes[1], bytes[2], bytes[3])
    }
}

/// Signing key of the certificate authority.
#[derive(Clone)]
pub struct AuthoritySigningKey(SigningKey);

impl AuthoritySigningKey {
    /// Generate a fresh authority key.
    pub fn generate<R: CryptoRng + RngCore + ?Sized>(mut rng: &mut R) -> Self {
        Self(SigningKey::random(&mut rng))
    }

    /// Rebuild from a 48-byte secret scalar.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretKey` if the bytes are not a valid non-zero scalar
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        SigningKey::from_slice(bytes).map(Self).map_err(|_| CryptoError::InvalidSecretKey)
    }

    /// Export the secret scalar.
    pub fn to_secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Matching verification key.
    pub fn public_key(&self) -> AuthorityPublicKey {
        AuthorityPublicKey(*self.0.verifying_key())
    }

    /// Sign `message`, returning the 96-byte fixed encoding.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.0.sign(message);
        signature.to_bytes().to_vec()
    }
}

impl fmt::Debug for AuthoritySigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthoritySigningKey")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}
