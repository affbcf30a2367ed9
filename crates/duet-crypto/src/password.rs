//! Password-derived keys for sealing persisted state.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{chain::KEY_SIZE, error::CryptoError};

/// PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ROUNDS: u32 = 210_000;

/// Minimum accepted salt length (16 bytes)
pub const MIN_SALT_SIZE: usize = 16;

/// Stretch `password` into a 32-byte AEAD key.
///
/// # Errors
///
/// - `InvalidSalt` if `salt` is shorter than [`MIN_SALT_SIZE`]
pub fn derive_password_key(
    password: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::InvalidSalt { min: MIN_SALT_SIZE, actual: salt.len() });
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, key.as_mut());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; MIN_SALT_SIZE] = [0x11; MIN_SALT_SIZE];

    #[test]
    fn same_inputs_same_key() {
        let a = derive_password_key(b"hunter2", &SALT).unwrap();
        let b = derive_password_key(b"hunter2", &SALT).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn different_password_different_key() {
        let a = derive_password_key(b"hunter2", &SALT).unwrap();
        let b = derive_password_key(b"hunter3", &SALT).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn different_salt_different_key() {
        let a = derive_password_key(b"hunter2", &SALT).unwrap();
        let b = derive_password_key(b"hunter2", &[0x22; 32]).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn short_salt_rejected() {
        let result = derive_password_key(b"hunter2", &[0u8; 8]);
        assert_eq!(result.unwrap_err(), CryptoError::InvalidSalt { min: 16, actual: 8 });
    }
}
