//! Authenticated encryption using `XChaCha20-Poly1305`
//!
//! The IV is always caller-provided. Message IVs travel in the message header;
//! since the header bytes are also the associated data, an IV cannot be
//! swapped without failing authentication.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{CryptoRng, RngCore};

use crate::{chain::KEY_SIZE, error::CryptoError};

/// Size of the `XChaCha20` nonce (24 bytes)
pub const IV_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// A 24-byte `XChaCha20` nonce.
pub type Iv = [u8; IV_SIZE];

/// Draw a fresh random IV.
///
/// 24-byte nonces are large enough that random generation never collides in
/// practice, even under a long-lived key.
pub fn random_iv<R: CryptoRng + RngCore + ?Sized>(rng: &mut R) -> Iv {
    let mut iv = [0u8; IV_SIZE];
    rng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` and bind `aad` to the result.
///
/// Returns the ciphertext with the 16-byte tag appended.
pub fn seal(key: &[u8; KEY_SIZE], iv: &Iv, plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(iv), Payload { msg: plaintext, aad })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Decrypt and authenticate `ciphertext` against `aad`.
///
/// # Errors
///
/// - `AeadFailure` if the key, IV, ciphertext or associated data do not
///   match what was sealed
pub fn open(
    key: &[u8; KEY_SIZE],
    iv: &Iv,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadFailure)
}
