//! Error types for the session engine.
//!
//! Two layers: [`SessionError`] for per-message operations, where every
//! variant carries a rollback guarantee, and [`StateError`] for the
//! persistence boundary.

use duet_crypto::CryptoError;
use duet_proto::ProtocolError;
use thiserror::Error;

/// Errors from certificate handling and from sending or receiving a message.
///
/// No variant leaves partial state behind: a failed call has exactly the
/// effect of not having been made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Certificate signature did not verify; nothing was cached
    #[error("certificate for {username} is invalid")]
    CertificateInvalid {
        /// Username the certificate claimed
        username: String,
    },

    /// No verified certificate for a peer that needs a new session
    #[error("no verified certificate for peer {peer}")]
    UnknownPeer {
        /// Peer name
        peer: String,
    },

    /// Header malformed, non-canonical, or inconsistent with session state
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        /// What was wrong
        reason: String,
    },

    /// Message index already consumed in the current receiving chain
    #[error("message {index} was already received")]
    ReplayOrDuplicate {
        /// Index of the duplicate message
        index: u32,
    },

    /// AEAD authentication failed; session state was rolled back
    #[error("message authentication failed")]
    DecryptionFailure,

    /// The client has no identity key yet
    #[error("client has no identity key")]
    NoIdentity,
}

impl SessionError {
    /// Returns true if retrying the same input can never succeed.
    ///
    /// Decryption failures are not fatal: the session was rolled back, so a
    /// correct copy of the message (or the next one) still decrypts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CertificateInvalid { .. }
                | Self::UnknownPeer { .. }
                | Self::ProtocolViolation { .. }
                | Self::NoIdentity
        )
    }

    /// Returns true if the caller should silently discard the message.
    pub fn should_drop(&self) -> bool {
        matches!(self, Self::ReplayOrDuplicate { .. })
    }

    pub(crate) fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation { reason: reason.into() }
    }
}

/// Wire decoding failures are protocol violations from the session's view
impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::ProtocolViolation { reason: err.to_string() }
    }
}

/// Errors from exporting, importing, sealing or opening client state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Serializing the state document failed
    #[error("state encode failed: {0}")]
    Encode(String),

    /// The bytes are not a state document
    #[error("state decode failed: {0}")]
    Decode(String),

    /// The document was written by an incompatible version
    #[error("unsupported state version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// A key in the document cannot be imported for its usage
    #[error("invalid {what} in state document")]
    InvalidKey {
        /// Which key failed
        what: &'static str,
    },

    /// A cached certificate no longer verifies under the authority key
    #[error("cached certificate for {username} does not verify")]
    Certificate {
        /// Username of the rejected certificate
        username: String,
    },

    /// Sealed state did not authenticate under the given password
    #[error("wrong password or corrupted sealed state")]
    WrongPassword,

    /// Primitive failure other than authentication
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_is_dropped_not_fatal() {
        let err = SessionError::ReplayOrDuplicate { index: 3 };
        assert!(err.should_drop());
        assert!(!err.is_fatal());
    }

    #[test]
    fn decryption_failure_is_retryable() {
        assert!(!SessionError::DecryptionFailure.is_fatal());
        assert!(!SessionError::DecryptionFailure.should_drop());
    }

    #[test]
    fn terminal_errors_are_fatal() {
        assert!(SessionError::CertificateInvalid { username: "eve".into() }.is_fatal());
        assert!(SessionError::UnknownPeer { peer: "bob".into() }.is_fatal());
        assert!(SessionError::violation("bad header").is_fatal());
        assert!(SessionError::NoIdentity.is_fatal());
    }

    #[test]
    fn protocol_errors_become_violations() {
        let err: SessionError = ProtocolError::NonCanonical.into();
        assert!(matches!(err, SessionError::ProtocolViolation { .. }));
    }
}
