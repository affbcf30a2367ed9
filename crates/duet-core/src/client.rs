//! Client state machine.
//!
//! The `Client` owns one identity key pair, the verified certificates of its
//! peers, and one ratchet session per peer. Sessions are created lazily: the
//! first `send_message` to a peer initiates one, the first
//! `receive_message` from a peer responds to one.
//!
//! Every public operation either completes or leaves the client exactly as it
//! was. A new session is committed to the store only after its first message
//! was encrypted or authenticated.

use std::sync::Arc;

use duet_crypto::{AuthorityPublicKey, DhKeyPair, DhPublicKey};
use duet_proto::{Certificate, SignedCertificate, WireMessage};

use crate::{
    certificates::CertificateVerifier,
    config::ClientConfig,
    env::{EnvRng, Environment},
    error::SessionError,
    escrow::EscrowPolicy,
    session::{InboundMessage, RatchetSession},
    store::SessionStore,
};

/// Local identity: the username and the key pair its certificate binds.
pub(crate) struct LocalIdentity {
    pub(crate) username: String,
    pub(crate) keypair: DhKeyPair,
}

/// Pairwise messaging client.
pub struct Client<E: Environment> {
    /// Environment for randomness.
    env: E,

    /// Authority key and verified peer certificates.
    verifier: CertificateVerifier,

    /// Applied to every message key before it is used.
    escrow_policy: Arc<dyn EscrowPolicy>,

    /// Protocol limits.
    config: ClientConfig,

    /// `None` until a certificate is generated or state is imported.
    identity: Option<LocalIdentity>,

    /// Ratchet sessions by peer name.
    sessions: SessionStore,
}

impl<E: Environment> Client<E> {
    /// Create a client without an identity.
    ///
    /// Call [`Client::generate_certificate`] before sending or receiving.
    pub fn new(
        env: E,
        authority: AuthorityPublicKey,
        escrow_policy: Arc<dyn EscrowPolicy>,
        config: ClientConfig,
    ) -> Self {
        Self {
            env,
            verifier: CertificateVerifier::new(authority),
            escrow_policy,
            config,
            identity: None,
            sessions: SessionStore::new(),
        }
    }

    pub(crate) fn from_parts(
        env: E,
        verifier: CertificateVerifier,
        escrow_policy: Arc<dyn EscrowPolicy>,
        config: ClientConfig,
        identity: Option<LocalIdentity>,
        sessions: SessionStore,
    ) -> Self {
        Self { env, verifier, escrow_policy, config, identity, sessions }
    }

    /// Generate a fresh identity key pair and the unsigned certificate
    /// binding it to `username`.
    ///
    /// The certificate goes to the authority for signing. Replaces any
    /// previous identity; existing sessions keep the keys they were derived
    /// from.
    pub fn generate_certificate(&mut self, username: impl Into<String>) -> Certificate {
        let username = username.into();
        let keypair = DhKeyPair::generate(&mut EnvRng::new(&self.env));
        let certificate = Certificate::new(username.clone(), keypair.public().to_bytes());

        if let Some(previous) = &self.identity {
            tracing::warn!("Replacing identity of {} with a new key pair", previous.username);
        }
        tracing::debug!("Generated identity for {}", username);

        self.identity = Some(LocalIdentity { username, keypair });
        certificate
    }

    /// Verify a peer certificate and cache it.
    ///
    /// # Errors
    ///
    /// - `CertificateInvalid` if the authority signature does not verify
    pub fn receive_certificate(&mut self, signed: &SignedCertificate) -> Result<(), SessionError> {
        self.verifier.verify(signed)
    }

    /// Encrypt `plaintext` for `peer`.
    ///
    /// Initiates a session from the peer's cached certificate if none exists.
    ///
    /// # Errors
    ///
    /// - `NoIdentity` if no identity key exists
    /// - `UnknownPeer` if there is no session and no verified certificate for
    ///   `peer`
    /// - `ProtocolViolation` if the plaintext does not fit a wire message
    pub fn send_message(
        &mut self,
        peer: &str,
        plaintext: &[u8],
    ) -> Result<WireMessage, SessionError> {
        let identity = self.identity.as_ref().ok_or(SessionError::NoIdentity)?;
        let mut rng = EnvRng::new(&self.env);

        if let Some(session) = self.sessions.get_mut(peer) {
            return session.encrypt(plaintext, self.escrow_policy.as_ref(), &mut rng);
        }

        let certificate = self
            .verifier
            .get(peer)
            .ok_or_else(|| SessionError::UnknownPeer { peer: peer.to_owned() })?;

        let mut session = RatchetSession::initiate(&identity.keypair, certificate.identity(), &mut rng);
        let message = session.encrypt(plaintext, self.escrow_policy.as_ref(), &mut rng)?;

        tracing::debug!("Initiated session with {}", peer);
        self.sessions.commit(peer, session);
        Ok(message)
    }

    /// Decrypt a message from `peer`.
    ///
    /// Responds to a new session from the peer's cached certificate if none
    /// exists.
    ///
    /// # Errors
    ///
    /// - `NoIdentity` if no identity key exists
    /// - `UnknownPeer` if there is no session and no verified certificate for
    ///   `peer`
    /// - `ProtocolViolation`, `ReplayOrDuplicate`, `DecryptionFailure` from
    ///   the session; the client is unchanged
    pub fn receive_message(
        &mut self,
        peer: &str,
        message: &WireMessage,
    ) -> Result<Vec<u8>, SessionError> {
        self.receive_inner(peer, message).inspect_err(|err| {
            if err.should_drop() {
                tracing::debug!("Dropped message from {}: {}", peer, err);
            } else {
                tracing::warn!("Rejected message from {}: {}", peer, err);
            }
        })
    }

    fn receive_inner(&mut self, peer: &str, message: &WireMessage) -> Result<Vec<u8>, SessionError> {
        let identity = self.identity.as_ref().ok_or(SessionError::NoIdentity)?;
        let inbound = InboundMessage::parse(message)?;

        if let Some(session) = self.sessions.get_mut(peer) {
            return session.decrypt(&inbound, &self.config);
        }

        let certificate = self
            .verifier
            .get(peer)
            .ok_or_else(|| SessionError::UnknownPeer { peer: peer.to_owned() })?;

        let mut session =
            RatchetSession::respond(&identity.keypair, certificate.identity(), &inbound.ratchet);
        let plaintext = session.decrypt(&inbound, &self.config)?;

        tracing::debug!("Accepted session from {}", peer);
        self.sessions.commit(peer, session);
        Ok(plaintext)
    }

    /// Local username. `None` before an identity exists.
    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.username.as_str())
    }

    /// Local identity public key. `None` before an identity exists.
    pub fn identity_public_key(&self) -> Option<&DhPublicKey> {
        self.identity.as_ref().map(|identity| identity.keypair.public())
    }

    /// Check if a session with `peer` exists.
    pub fn has_session(&self, peer: &str) -> bool {
        self.sessions.contains(peer)
    }

    /// Read-only view of the session with `peer`.
    pub fn session(&self, peer: &str) -> Option<&RatchetSession> {
        self.sessions.get(peer)
    }

    /// All sessions.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Verified peer certificates.
    pub fn certificates(&self) -> &CertificateVerifier {
        &self.verifier
    }

    /// Protocol limits in effect.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The escrow policy applied to outgoing messages.
    pub fn escrow_policy(&self) -> &Arc<dyn EscrowPolicy> {
        &self.escrow_policy
    }

    pub(crate) fn identity(&self) -> Option<&LocalIdentity> {
        self.identity.as_ref()
    }
}
