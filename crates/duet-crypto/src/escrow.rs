//! Per-message key escrow to a fixed third-party key.
//!
//! Each message key is wrapped under a key derived from a fresh ephemeral DH
//! with the escrow holder's public key. Packages share no key material with
//! each other or with the ratchet; opening one reveals exactly one message key.

use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::{
    aead::{self, Iv},
    chain::MessageKey,
    derivation::escrow_wrapping_key,
    error::CryptoError,
    keys::{DhKeyPair, DhPublicKey},
};

/// A message key sealed to the escrow holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowPackage {
    /// Ephemeral public key for this package only
    pub ephemeral_public: DhPublicKey,
    /// AEAD ciphertext of the raw message key
    pub ciphertext: Vec<u8>,
    /// IV of the wrapping AEAD
    pub iv: Iv,
}

/// Seal `message_key` to `escrow_public`.
///
/// The ephemeral public key is bound as associated data, so a package cannot
/// be re-pointed at a different ephemeral key.
pub fn seal<R: CryptoRng + RngCore + ?Sized>(
    message_key: &MessageKey,
    escrow_public: &DhPublicKey,
    rng: &mut R,
) -> EscrowPackage {
    let ephemeral = DhKeyPair::generate(rng);
    let wrapping = escrow_wrapping_key(&ephemeral.diffie_hellman(escrow_public));
    let iv = aead::random_iv(rng);
    let ephemeral_public = *ephemeral.public();

    let ciphertext =
        aead::seal(wrapping.as_bytes(), &iv, message_key.as_bytes(), &ephemeral_public.to_bytes());

    EscrowPackage { ephemeral_public, ciphertext, iv }
}

/// Recover the message key from a package with the escrow holder's key pair.
///
/// # Errors
///
/// - `AeadFailure` if the package was not sealed to this key or was modified
/// - `InvalidKeyLength` if the recovered plaintext is not a 32-byte key
pub fn open(package: &EscrowPackage, escrow_key: &DhKeyPair) -> Result<MessageKey, CryptoError> {
    let wrapping = escrow_wrapping_key(&escrow_key.diffie_hellman(&package.ephemeral_public));
    let raw = Zeroizing::new(aead::open(
        wrapping.as_bytes(),
        &package.iv,
        &package.ciphertext,
        &package.ephemeral_public.to_bytes(),
    )?);

    MessageKey::from_slice(&raw)
}
