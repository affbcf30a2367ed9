//! P-384 Diffie-Hellman keys.
//!
//! One key type serves identity keys, ratchet keys and escrow keys. Public keys
//! travel as SEC1 compressed points; secret keys are only ever exported at the
//! state serialization boundary.

use std::fmt;

use p384::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// SEC1 compressed P-384 point size (49 bytes)
pub const PUBLIC_KEY_SIZE: usize = 49;

/// P-384 secret scalar size (48 bytes)
pub const SECRET_KEY_SIZE: usize = 48;

/// Raw ECDH output size (48 bytes, the x-coordinate)
pub const SHARED_SECRET_SIZE: usize = 48;

/// SHA-256 digest of a public key's compressed encoding.
pub type KeyFingerprint = [u8; 32];

/// A P-384 public key usable for Diffie-Hellman.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DhPublicKey(PublicKey);

impl DhPublicKey {
    /// Parse a SEC1 encoded point (compressed or uncompressed).
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey` if the bytes are not a point on P-384
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        PublicKey::from_sec1_bytes(bytes).map(Self).map_err(|_| CryptoError::InvalidPublicKey {
            reason: format!("{} bytes do not encode a P-384 point", bytes.len()),
        })
    }

    /// SEC1 compressed encoding (49 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Stable fingerprint used to index cached message keys by ratchet key.
    pub fn fingerprint(&self) -> KeyFingerprint {
        Sha256::digest(self.to_bytes()).into()
    }
}

impl fmt::Debug for DhPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fp = self.fingerprint();
        write!(f, "DhPublicKey({:02x}{:02x}{:02x}{:02x}..)", fp[0], fp[1], fp[2], fp[3])
    }
}

/// Shared secret produced by ECDH. Zeroized on drop.
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Raw shared secret bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A P-384 key pair.
///
/// Used for long-term identity keys, per-session ratchet keys, and escrow keys.
/// The secret scalar is zeroized when the pair is dropped.
#[derive(Clone)]
pub struct DhKeyPair {
    secret: SecretKey,
    public: DhPublicKey,
}

impl DhKeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: CryptoRng + RngCore + ?Sized>(mut rng: &mut R) -> Self {
        let secret = SecretKey::random(&mut rng);
        let public = DhPublicKey(secret.public_key());
        Self { secret, public }
    }

    /// Rebuild a key pair from its 48-byte secret scalar.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretKey` if the bytes are not a valid non-zero scalar
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidSecretKey);
        }
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = DhPublicKey(secret.public_key());
        Ok(Self { secret, public })
    }

    /// Export the secret scalar. Only the state serializer should call this.
    pub fn to_secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret.to_bytes().to_vec())
    }

    /// Public half of the pair.
    pub fn public(&self) -> &DhPublicKey {
        &self.public
    }

    /// Compute ECDH with a peer public key.
    pub fn diffie_hellman(&self, peer: &DhPublicKey) -> SharedSecret {
        let shared = p384::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.0.as_affine());
        let mut bytes = [0u8; SHARED_SECRET_SIZE];
        bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
        SharedSecret(bytes)
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhKeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}
