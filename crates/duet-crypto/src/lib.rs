//! Duet Cryptographic Primitives
//!
//! Cryptographic building blocks for the duet pairwise ratchet. Pure functions
//! over explicit key types. Callers provide the random number generator so
//! tests can run against a seeded generator.
//!
//! # Key Lifecycle
//!
//! Each pair of users shares one ratchet session. The session is seeded from
//! two Diffie-Hellman computations over long-term identity keys, then mixes in
//! a fresh DH output every time a party sees a new ratchet key from its peer.
//! Every DH step yields a new chain, and the chain produces one-time message
//! keys.
//!
//! ```text
//! DH(identity, identity) + DH(ratchet, identity)
//!        │
//!        ▼
//! HKDF → Root Key ──┬── DH(ratchet, ratchet) ─► HKDF → Root Key' ...
//!                   │
//!                   ▼
//!              Chain Key → HMAC → Chain Key' → HMAC → ...
//!                   │                  │
//!                   ▼                  ▼
//!              Message Key 0      Message Key 1
//!                   │
//!                   ▼
//!        AEAD (header bytes as associated data) → Ciphertext
//! ```
//!
//! Message keys are used for exactly one encryption operation. Chain keys are
//! consumed by value when advanced, so a chain key can never produce two
//! message keys.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain advancement: old chain keys are zeroized after deriving the next key
//! - DH ratchet: a compromised chain does not reveal chains derived after the
//!   next DH step
//!
//! Authenticity:
//! - XChaCha20-Poly1305 binds the ciphertext to the serialized message header
//! - Identity keys are only trusted through ECDSA P-384 certificates
//!
//! Escrow:
//! - Every message key can additionally be sealed to a fixed third-party key
//!   with an independent ephemeral DH (see [`escrow`]). The escrow package is
//!   structurally independent of the ratchet.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod chain;
pub mod derivation;
pub mod error;
pub mod escrow;
pub mod keys;
pub mod password;
pub mod signature;

pub use aead::{IV_SIZE, Iv, TAG_SIZE, open, seal};
pub use chain::{ChainKey, KEY_SIZE, MessageKey, RootKey};
pub use derivation::{kdf_initial, kdf_root};
pub use error::CryptoError;
pub use escrow::EscrowPackage;
pub use keys::{DhKeyPair, DhPublicKey, KeyFingerprint, SharedSecret};
pub use password::{MIN_SALT_SIZE, PBKDF2_ROUNDS, derive_password_key};
pub use signature::{AuthorityPublicKey, AuthoritySigningKey, SIGNATURE_SIZE};
