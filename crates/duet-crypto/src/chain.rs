//! Symmetric chain ratchet for forward-secure message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: advancing consumes the chain key, which is zeroized
//! - Key Uniqueness: each step produces a distinct message key
//! - Determinism: the same chain key always produces the same sequence

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Size of every symmetric key in the ratchet (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message key
const MESSAGE_LABEL: &[u8] = b"message";

macro_rules! secret_key_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            /// Wrap raw key bytes.
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Wrap raw key bytes from a slice, checking the length.
            ///
            /// # Errors
            ///
            /// - `InvalidKeyLength` if the slice is not exactly 32 bytes
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
                    CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: bytes.len() }
                })?;
                Ok(Self(array))
            }

            /// Raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

secret_key_type!(
    /// Root key of a ratchet session. Only ever used as HKDF input.
    RootKey
);

secret_key_type!(
    /// Chain key of a sending or receiving chain.
    ChainKey
);

secret_key_type!(
    /// One-time AEAD key for a single message.
    MessageKey
);

impl ChainKey {
    /// Derive this step's message key and the successor chain key.
    ///
    /// Consumes the chain key: the old value is zeroized on return, so it
    /// cannot yield a second message key.
    pub fn advance(self) -> (MessageKey, ChainKey) {
        let message_key = MessageKey(hmac(&self.0, MESSAGE_LABEL));
        let next = ChainKey(hmac(&self.0, CHAIN_LABEL));
        (message_key, next)
    }
}

fn hmac(key: &[u8; KEY_SIZE], label: &[u8]) -> [u8; KEY_SIZE] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&result);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_chain() -> ChainKey {
        let mut seed = [0u8; KEY_SIZE];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = i as u8;
        }
        ChainKey::from_bytes(seed)
    }

    #[test]
    fn advance_produces_unique_keys() {
        let (key0, chain) = test_chain().advance();
        let (key1, chain) = chain.advance();
        let (key2, _) = chain.advance();

        assert_ne!(key0.as_bytes(), key1.as_bytes(), "keys must be unique");
        assert_ne!(key1.as_bytes(), key2.as_bytes(), "keys must be unique");
        assert_ne!(key0.as_bytes(), key2.as_bytes(), "keys must be unique");
    }

    #[test]
    fn message_key_differs_from_next_chain_key() {
        let (message_key, next) = test_chain().advance();
        assert_ne!(message_key.as_bytes(), next.as_bytes());
    }

    #[test]
    fn chain_is_deterministic() {
        let mut a = test_chain();
        let mut b = test_chain();

        for _ in 0..10 {
            let (ka, na) = a.advance();
            let (kb, nb) = b.advance();
            assert_eq!(ka.as_bytes(), kb.as_bytes(), "same chain must produce same keys");
            a = na;
            b = nb;
        }
    }

    #[test]
    fn different_chains_produce_different_keys() {
        let (k1, _) = ChainKey::from_bytes([1u8; KEY_SIZE]).advance();
        let (k2, _) = ChainKey::from_bytes([2u8; KEY_SIZE]).advance();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(MessageKey::from_slice(&[0u8; KEY_SIZE]).is_ok());
        assert!(matches!(
            RootKey::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn debug_is_redacted() {
        assert_eq!(format!("{:?}", test_chain()), "ChainKey(..)");
    }
}
