//! Certificate verification and the verified-certificate cache.
//!
//! The authority key is the only trust anchor. A peer identity key is used
//! for Diffie-Hellman only after it has come out of this cache.

use std::collections::HashMap;

use duet_crypto::{AuthorityPublicKey, DhPublicKey};
use duet_proto::SignedCertificate;

use crate::error::SessionError;

/// A certificate whose signature has been checked.
#[derive(Debug, Clone)]
pub struct VerifiedCertificate {
    signed: SignedCertificate,
    identity: DhPublicKey,
}

impl VerifiedCertificate {
    /// Username bound by the certificate.
    pub fn username(&self) -> &str {
        &self.signed.certificate.username
    }

    /// Parsed identity public key.
    pub fn identity(&self) -> &DhPublicKey {
        &self.identity
    }

    /// The certificate as received, with its signature.
    pub fn signed(&self) -> &SignedCertificate {
        &self.signed
    }
}

/// Verifies certificates against the authority key and caches the verified
/// ones by username.
///
/// # Invariants
///
/// - Every cached entry verified under `authority` when it was inserted
/// - Failed verification never touches the cache
#[derive(Debug, Clone)]
pub struct CertificateVerifier {
    authority: AuthorityPublicKey,
    cache: HashMap<String, VerifiedCertificate>,
}

impl CertificateVerifier {
    /// Create a verifier trusting `authority`.
    pub fn new(authority: AuthorityPublicKey) -> Self {
        Self { authority, cache: HashMap::new() }
    }

    /// The trusted authority key.
    pub fn authority(&self) -> &AuthorityPublicKey {
        &self.authority
    }

    /// Check a certificate without caching it.
    ///
    /// # Errors
    ///
    /// - `CertificateInvalid` if the signature does not verify over the
    ///   canonical encoding, or the bound key is not a P-384 point
    pub fn check(&self, signed: &SignedCertificate) -> Result<VerifiedCertificate, SessionError> {
        let invalid = || SessionError::CertificateInvalid {
            username: signed.certificate.username.clone(),
        };

        let message = signed.certificate.canonical_bytes().map_err(|_| invalid())?;
        if !self.authority.verify(&message, &signed.signature) {
            return Err(invalid());
        }

        let identity =
            DhPublicKey::from_sec1_bytes(&signed.certificate.public_key).map_err(|_| invalid())?;

        Ok(VerifiedCertificate { signed: signed.clone(), identity })
    }

    /// Verify a certificate and cache it under its username.
    ///
    /// A newer certificate for an already cached username replaces the old
    /// entry.
    ///
    /// # Errors
    ///
    /// - `CertificateInvalid` as for [`CertificateVerifier::check`]; the
    ///   cache is unchanged
    pub fn verify(&mut self, signed: &SignedCertificate) -> Result<(), SessionError> {
        let verified = match self.check(signed) {
            Ok(verified) => verified,
            Err(err) => {
                tracing::warn!("Rejected certificate for {}", signed.certificate.username);
                return Err(err);
            },
        };

        tracing::debug!("Cached certificate for {}", verified.username());
        self.cache.insert(verified.username().to_owned(), verified);
        Ok(())
    }

    /// Cached certificate for `username`.
    pub fn get(&self, username: &str) -> Option<&VerifiedCertificate> {
        self.cache.get(username)
    }

    /// Iterate over all cached certificates.
    pub fn iter(&self) -> impl Iterator<Item = &VerifiedCertificate> {
        self.cache.values()
    }

    /// Number of cached certificates.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
