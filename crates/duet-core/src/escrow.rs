//! Pluggable escrow policy.
//!
//! The ratchet hands every message key to the configured policy before it
//! encrypts with it. What comes back travels in the message header. The
//! ratchet never reads escrow fields, so a receiver does not care which
//! policy the sender ran.

use duet_crypto::{DhPublicKey, EscrowPackage, MessageKey, escrow};
use duet_proto::EscrowFields;

use crate::env::SecureRng;

/// Decides whether and how message keys are escrowed.
pub trait EscrowPolicy: Send + Sync {
    /// Wrap `message_key` for the escrow holder, or return `None` to send
    /// the message without escrow fields.
    fn wrap(&self, message_key: &MessageKey, rng: &mut dyn SecureRng) -> Option<EscrowPackage>;
}

/// Never escrows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscrow;

impl EscrowPolicy for NoEscrow {
    fn wrap(&self, _message_key: &MessageKey, _rng: &mut dyn SecureRng) -> Option<EscrowPackage> {
        None
    }
}

/// Seals every message key to one fixed escrow public key.
#[derive(Debug, Clone, Copy)]
pub struct FixedKeyEscrow {
    escrow_public: DhPublicKey,
}

impl FixedKeyEscrow {
    /// Escrow to `escrow_public`.
    pub fn new(escrow_public: DhPublicKey) -> Self {
        Self { escrow_public }
    }

    /// The escrow holder's public key.
    pub fn escrow_public(&self) -> &DhPublicKey {
        &self.escrow_public
    }
}

impl EscrowPolicy for FixedKeyEscrow {
    fn wrap(&self, message_key: &MessageKey, rng: &mut dyn SecureRng) -> Option<EscrowPackage> {
        Some(escrow::seal(message_key, &self.escrow_public, rng))
    }
}

/// Header representation of an escrow package.
pub fn to_fields(package: &EscrowPackage) -> EscrowFields {
    EscrowFields {
        ephemeral_public_key: package.ephemeral_public.to_bytes(),
        ciphertext: package.ciphertext.clone(),
        iv: package.iv,
    }
}

/// Parse header escrow fields back into a package.
///
/// Only the escrow holder calls this; receivers ignore escrow fields.
///
/// # Errors
///
/// - `InvalidPublicKey` if the ephemeral key is not a P-384 point
pub fn from_fields(fields: &EscrowFields) -> Result<EscrowPackage, duet_crypto::CryptoError> {
    Ok(EscrowPackage {
        ephemeral_public: DhPublicKey::from_sec1_bytes(&fields.ephemeral_public_key)?,
        ciphertext: fields.ciphertext.clone(),
        iv: fields.iv,
    })
}
