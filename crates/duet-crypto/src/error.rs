//! Error types for cryptographic primitives

use thiserror::Error;

/// Errors from primitive operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Bytes do not encode a valid P-384 public key
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Why the encoding was rejected
        reason: String,
    },

    /// Bytes do not encode a valid P-384 secret scalar
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Invalid symmetric key material length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Password salt shorter than the minimum
    #[error("salt too short: need at least {min} bytes, got {actual}")]
    InvalidSalt {
        /// Minimum salt length
        min: usize,
        /// Actual salt length
        actual: usize,
    },

    /// AEAD authentication failed (wrong key, tampered ciphertext or
    /// associated data)
    #[error("AEAD authentication failed")]
    AeadFailure,
}

impl CryptoError {
    /// Returns true if the error was caused by malformed input rather than
    /// by a failed authentication check.
    pub fn is_malformed_input(&self) -> bool {
        match self {
            Self::InvalidPublicKey { .. }
            | Self::InvalidSecretKey
            | Self::InvalidKeyLength { .. }
            | Self::InvalidSalt { .. } => true,
            Self::AeadFailure => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_failure_is_not_malformed_input() {
        assert!(!CryptoError::AeadFailure.is_malformed_input());
    }

    #[test]
    fn key_errors_are_malformed_input() {
        assert!(CryptoError::InvalidSecretKey.is_malformed_input());
        assert!(CryptoError::InvalidKeyLength { expected: 32, actual: 31 }.is_malformed_input());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 32, actual: 16 };
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 16");
    }
}
