//! Client state export, import and password sealing.
//!
//! The state document is CBOR and carries every secret the client holds:
//! the identity scalar, root and chain keys, every ratchet private key and
//! every cached skipped key. Importing it yields a client that behaves
//! identically to the one that exported it, including decryption of messages
//! that were still outstanding at export time.
//!
//! Treat exported bytes as key material. [`seal_state`] wraps them under a
//! password-derived key for storage.

use std::sync::Arc;

use duet_crypto::{
    AuthorityPublicKey, ChainKey, DhKeyPair, DhPublicKey, Iv, KEY_SIZE, KeyFingerprint,
    MIN_SALT_SIZE, MessageKey, RootKey, aead, derive_password_key,
};
use duet_proto::SignedCertificate;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    certificates::CertificateVerifier,
    client::{Client, LocalIdentity},
    config::ClientConfig,
    env::{Environment, SecureRng},
    error::StateError,
    escrow::EscrowPolicy,
    session::{RatchetSession, RatchetState},
    store::SessionStore,
};

/// Version written by [`export_state`] and accepted by [`import_state`].
pub const STATE_VERSION: u32 = 1;

/// Associated data binding sealed state to its purpose.
const SEALED_STATE_AAD: &[u8] = b"duetSealedStateV1";

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateDocument {
    version: u32,
    identity: Option<IdentityRecord>,
    certificates: Vec<SignedCertificate>,
    sessions: Vec<SessionRecord>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct IdentityRecord {
    username: String,
    secret_key: Vec<u8>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct SessionRecord {
    peer: String,
    self_ratchet_secret: Vec<u8>,
    peer_ratchet_public: Vec<u8>,
    root_key: [u8; KEY_SIZE],
    sending_chain: Option<[u8; KEY_SIZE]>,
    receiving_chain: Option<[u8; KEY_SIZE]>,
    send_counter: u32,
    receive_counter: u32,
    previous_chain_length: u32,
    skipped: Vec<SkippedKeyRecord>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct SkippedKeyRecord {
    ratchet: KeyFingerprint,
    index: u32,
    key: [u8; KEY_SIZE],
}

impl SessionRecord {
    fn capture(peer: &str, session: &RatchetSession) -> Self {
        let state = &session.state;
        let skipped = session
            .skipped
            .iter()
            .map(|(ratchet, index, key)| SkippedKeyRecord {
                ratchet: *ratchet,
                index,
                key: *key.as_bytes(),
            })
            .collect();

        Self {
            peer: peer.to_owned(),
            self_ratchet_secret: state.self_ratchet.to_secret_bytes().to_vec(),
            peer_ratchet_public: state.peer_ratchet.to_bytes(),
            root_key: *state.root_key.as_bytes(),
            sending_chain: state.sending_chain.as_ref().map(|chain| *chain.as_bytes()),
            receiving_chain: state.receiving_chain.as_ref().map(|chain| *chain.as_bytes()),
            send_counter: state.send_counter,
            receive_counter: state.receive_counter,
            previous_chain_length: state.previous_chain_length,
            skipped,
        }
    }

    fn restore(&self, config: &ClientConfig) -> Result<RatchetSession, StateError> {
        let self_ratchet = DhKeyPair::from_secret_bytes(&self.self_ratchet_secret)
            .map_err(|_| StateError::InvalidKey { what: "ratchet private key" })?;
        let peer_ratchet = DhPublicKey::from_sec1_bytes(&self.peer_ratchet_public)
            .map_err(|_| StateError::InvalidKey { what: "peer ratchet public key" })?;

        let mut session = RatchetSession::from_state(RatchetState {
            self_ratchet,
            peer_ratchet,
            root_key: RootKey::from_bytes(self.root_key),
            sending_chain: self.sending_chain.map(ChainKey::from_bytes),
            receiving_chain: self.receiving_chain.map(ChainKey::from_bytes),
            send_counter: self.send_counter,
            receive_counter: self.receive_counter,
            previous_chain_length: self.previous_chain_length,
        });

        for record in &self.skipped {
            session.skipped.insert(
                record.ratchet,
                record.index,
                MessageKey::from_bytes(record.key),
                config.max_skipped_keys,
            );
        }

        Ok(session)
    }
}

/// Serialize the full client state.
///
/// Sessions and certificates are written in name order, so exporting the
/// same state twice yields the same bytes.
///
/// # Errors
///
/// - `Encode` if CBOR serialization fails
pub fn export_state<E: Environment>(client: &Client<E>) -> Result<Zeroizing<Vec<u8>>, StateError> {
    let identity = client.identity().map(|identity| IdentityRecord {
        username: identity.username.clone(),
        secret_key: identity.keypair.to_secret_bytes().to_vec(),
    });

    let mut certificates: Vec<SignedCertificate> =
        client.certificates().iter().map(|verified| verified.signed().clone()).collect();
    certificates.sort_by(|a, b| a.certificate.username.cmp(&b.certificate.username));

    let mut sessions: Vec<SessionRecord> = client
        .sessions()
        .iter()
        .map(|(peer, session)| SessionRecord::capture(peer, session))
        .collect();
    sessions.sort_by(|a, b| a.peer.cmp(&b.peer));

    let document = StateDocument { version: STATE_VERSION, identity, certificates, sessions };

    let mut buf = Zeroizing::new(Vec::new());
    ciborium::into_writer(&document, &mut *buf).map_err(|e| StateError::Encode(e.to_string()))?;

    tracing::debug!(
        "Exported state with {} sessions and {} certificates",
        document.sessions.len(),
        document.certificates.len()
    );
    Ok(buf)
}

/// Rebuild a client from an exported state document.
///
/// Every cached certificate is verified again under `authority`. The escrow
/// policy and protocol limits are not part of the document; skipped keys
/// beyond `config.max_skipped_keys` are evicted oldest first.
///
/// # Errors
///
/// - `Decode` if the bytes are not a state document
/// - `UnsupportedVersion` if the document has a different version
/// - `Certificate` if a cached certificate does not verify
/// - `InvalidKey` if a stored key cannot be imported
pub fn import_state<E: Environment>(
    env: E,
    authority: AuthorityPublicKey,
    escrow_policy: Arc<dyn EscrowPolicy>,
    config: ClientConfig,
    bytes: &[u8],
) -> Result<Client<E>, StateError> {
    let document = decode_document(bytes)?;

    let mut verifier = CertificateVerifier::new(authority);
    for signed in &document.certificates {
        verifier.verify(signed).map_err(|_| StateError::Certificate {
            username: signed.certificate.username.clone(),
        })?;
    }

    let identity = match &document.identity {
        Some(record) => Some(LocalIdentity {
            username: record.username.clone(),
            keypair: DhKeyPair::from_secret_bytes(&record.secret_key)
                .map_err(|_| StateError::InvalidKey { what: "identity private key" })?,
        }),
        None => None,
    };

    let mut sessions = SessionStore::new();
    for record in &document.sessions {
        if sessions.contains(&record.peer) {
            return Err(StateError::Decode(format!("duplicate session for {}", record.peer)));
        }
        sessions.commit(record.peer.clone(), record.restore(&config)?);
    }

    tracing::debug!(
        "Imported state with {} sessions and {} certificates",
        sessions.len(),
        verifier.len()
    );
    Ok(Client::from_parts(env, verifier, escrow_policy, config, identity, sessions))
}

fn decode_document(bytes: &[u8]) -> Result<StateDocument, StateError> {
    let probe: VersionProbe =
        ciborium::from_reader(bytes).map_err(|e| StateError::Decode(e.to_string()))?;
    if probe.version != STATE_VERSION {
        return Err(StateError::UnsupportedVersion {
            found: probe.version,
            expected: STATE_VERSION,
        });
    }

    ciborium::from_reader(bytes).map_err(|e| StateError::Decode(e.to_string()))
}

/// Non-secret overview of a state document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    /// Document version
    pub version: u32,
    /// Local username, if the document has an identity
    pub username: Option<String>,
    /// Usernames with a cached certificate
    pub certificates: Vec<String>,
    /// One entry per session, in peer order
    pub sessions: Vec<SessionSummary>,
}

/// Counters of one stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Peer name
    pub peer: String,
    /// Messages sent on the current sending chain
    pub send_counter: u32,
    /// Messages received on the current receiving chain
    pub receive_counter: u32,
    /// Length of the previous sending chain
    pub previous_chain_length: u32,
    /// Cached skipped keys
    pub skipped_keys: usize,
    /// Whether the next send reuses the current sending chain
    pub has_sending_chain: bool,
}

/// Summarize a state document without importing any key.
///
/// # Errors
///
/// - `Decode` or `UnsupportedVersion` as for [`import_state`]
pub fn summarize_state(bytes: &[u8]) -> Result<StateSummary, StateError> {
    let document = decode_document(bytes)?;

    Ok(StateSummary {
        version: document.version,
        username: document.identity.as_ref().map(|identity| identity.username.clone()),
        certificates: document
            .certificates
            .iter()
            .map(|signed| signed.certificate.username.clone())
            .collect(),
        sessions: document
            .sessions
            .iter()
            .map(|record| SessionSummary {
                peer: record.peer.clone(),
                send_counter: record.send_counter,
                receive_counter: record.receive_counter,
                previous_chain_length: record.previous_chain_length,
                skipped_keys: record.skipped.len(),
                has_sending_chain: record.sending_chain.is_some(),
            })
            .collect(),
    })
}

/// State encrypted under a password-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealedState {
    /// PBKDF2 salt
    pub salt: Vec<u8>,
    /// AEAD IV
    pub iv: Iv,
    /// AEAD ciphertext of the state document
    pub data: Vec<u8>,
}

impl SealedState {
    /// Encode as CBOR.
    ///
    /// # Errors
    ///
    /// - `Encode` if CBOR serialization fails
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| StateError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    ///
    /// # Errors
    ///
    /// - `Decode` if the bytes are not a sealed state
    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        ciborium::from_reader(bytes).map_err(|e| StateError::Decode(e.to_string()))
    }
}

/// Encrypt exported state under `password`.
///
/// # Errors
///
/// - `Crypto` if key derivation fails
pub fn seal_state(
    state: &[u8],
    password: &str,
    rng: &mut dyn SecureRng,
) -> Result<SealedState, StateError> {
    let mut salt = vec![0u8; MIN_SALT_SIZE];
    rng.fill_bytes(&mut salt);

    let key = derive_password_key(password.as_bytes(), &salt)?;
    let iv = aead::random_iv(rng);
    let data = aead::seal(&key, &iv, state, SEALED_STATE_AAD);

    Ok(SealedState { salt, iv, data })
}

/// Decrypt sealed state.
///
/// # Errors
///
/// - `WrongPassword` if the ciphertext does not authenticate under the
///   password-derived key
/// - `Crypto` if the salt is too short
pub fn open_state(sealed: &SealedState, password: &str) -> Result<Zeroizing<Vec<u8>>, StateError> {
    let key = derive_password_key(password.as_bytes(), &sealed.salt)?;
    let state = aead::open(&key, &sealed.iv, &sealed.data, SEALED_STATE_AAD)
        .map_err(|_| StateError::WrongPassword)?;
    Ok(Zeroizing::new(state))
}

#[cfg(test)]
mod tests {
    use duet_crypto::AuthoritySigningKey;
    use duet_proto::Certificate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use std::collections::HashSet;

    use super::*;
    use crate::{env::SystemEnv, error::SessionError, escrow::NoEscrow};

    struct World {
        authority: AuthoritySigningKey,
        alice: Client<SystemEnv>,
        bob: Client<SystemEnv>,
    }

    fn sign(authority: &AuthoritySigningKey, certificate: Certificate) -> SignedCertificate {
        let signature = authority.sign(&certificate.canonical_bytes().unwrap());
        SignedCertificate { certificate, signature }
    }

    fn client(authority: &AuthoritySigningKey) -> Client<SystemEnv> {
        Client::new(
            SystemEnv::new(),
            authority.public_key(),
            Arc::new(NoEscrow),
            ClientConfig::default(),
        )
    }

    fn world() -> World {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let authority = AuthoritySigningKey::generate(&mut rng);
        let mut alice = client(&authority);
        let mut bob = client(&authority);
        let alice_cert = sign(&authority, alice.generate_certificate("alice"));
        let bob_cert = sign(&authority, bob.generate_certificate("bob"));
        alice.receive_certificate(&bob_cert).unwrap();
        bob.receive_certificate(&alice_cert).unwrap();
        World { authority, alice, bob }
    }

    fn peers(bytes: &[u8]) -> HashSet<String> {
        summarize_state(bytes).unwrap().sessions.into_iter().map(|session| session.peer).collect()
    }

    fn reimport(authority: &AuthoritySigningKey, client: &Client<SystemEnv>) -> Client<SystemEnv> {
        let bytes = export_state(client).unwrap();
        import_state(
            SystemEnv::new(),
            authority.public_key(),
            Arc::new(NoEscrow),
            ClientConfig::default(),
            &bytes,
        )
        .unwrap()
    }

    #[test]
    fn imported_client_decrypts_outstanding_messages() {
        let mut world = world();
        let m0 = world.alice.send_message("bob", b"m0").unwrap();
        let m1 = world.alice.send_message("bob", b"m1").unwrap();
        let m2 = world.alice.send_message("bob", b"m2").unwrap();
        world.bob.receive_message("alice", &m2).unwrap();

        let mut restored = reimport(&world.authority, &world.bob);

        assert_eq!(restored.session("alice").unwrap().skipped_len(), 2);
        assert_eq!(restored.receive_message("alice", &m0).unwrap(), b"m0");
        assert_eq!(restored.receive_message("alice", &m1).unwrap(), b"m1");
        assert_eq!(
            restored.receive_message("alice", &m2),
            Err(SessionError::ReplayOrDuplicate { index: 2 })
        );
    }

    #[test]
    fn imported_client_continues_conversation() {
        let mut world = world();
        let hello = world.alice.send_message("bob", b"hello").unwrap();
        world.bob.receive_message("alice", &hello).unwrap();

        let mut alice = reimport(&world.authority, &world.alice);
        let mut bob = reimport(&world.authority, &world.bob);

        let reply = bob.send_message("alice", b"reply").unwrap();
        assert_eq!(alice.receive_message("bob", &reply).unwrap(), b"reply");
        let again = alice.send_message("bob", b"again").unwrap();
        assert_eq!(bob.receive_message("alice", &again).unwrap(), b"again");
        assert_eq!(bob.username(), Some("bob"));
    }

    #[test]
    fn export_is_deterministic() {
        let mut world = world();
        let hello = world.alice.send_message("bob", b"hello").unwrap();
        world.bob.receive_message("alice", &hello).unwrap();

        let first = export_state(&world.bob).unwrap();
        let second = export_state(&reimport(&world.authority, &world.bob)).unwrap();

        assert_eq!(*first, *second);
        assert_eq!(peers(&first), HashSet::from(["alice".to_owned()]));
    }

    #[test]
    fn foreign_authority_rejects_cached_certificates() {
        let world = world();
        let bytes = export_state(&world.alice).unwrap();
        let rogue = AuthoritySigningKey::generate(&mut ChaCha20Rng::seed_from_u64(99));

        let result = import_state(
            SystemEnv::new(),
            rogue.public_key(),
            Arc::new(NoEscrow),
            ClientConfig::default(),
            &bytes,
        );

        assert!(matches!(result, Err(StateError::Certificate { username }) if username == "bob"));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &StateDocument {
                version: STATE_VERSION + 1,
                identity: None,
                certificates: Vec::new(),
                sessions: Vec::new(),
            },
            &mut buf,
        )
        .unwrap();

        assert_eq!(
            summarize_state(&buf),
            Err(StateError::UnsupportedVersion { found: STATE_VERSION + 1, expected: STATE_VERSION })
        );
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(summarize_state(&[0xFF, 0x00, 0x13]), Err(StateError::Decode(_))));
    }

    #[test]
    fn summary_reports_counters_only() {
        let mut world = world();
        for _ in 0..3 {
            world.alice.send_message("bob", b"x").unwrap();
        }
        let bytes = export_state(&world.alice).unwrap();

        let summary = summarize_state(&bytes).unwrap();

        assert_eq!(summary.username.as_deref(), Some("alice"));
        assert_eq!(summary.certificates, vec!["bob".to_owned()]);
        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].send_counter, 3);
        assert!(summary.sessions[0].has_sending_chain);
    }

    #[test]
    fn sealed_state_roundtrip() {
        let world = world();
        let bytes = export_state(&world.alice).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(5);

        let sealed = seal_state(&bytes, "correct horse", &mut rng).unwrap();
        let decoded = SealedState::decode(&sealed.encode().unwrap()).unwrap();
        let opened = open_state(&decoded, "correct horse").unwrap();

        assert_eq!(*opened, *bytes);
    }

    #[test]
    fn wrong_password_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let sealed = seal_state(b"state", "correct horse", &mut rng).unwrap();

        assert_eq!(open_state(&sealed, "battery staple"), Err(StateError::WrongPassword));
    }

    #[test]
    fn tampered_sealed_state_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut sealed = seal_state(b"state", "pw", &mut rng).unwrap();
        sealed.data[0] ^= 0x01;

        assert_eq!(open_state(&sealed, "pw"), Err(StateError::WrongPassword));
    }
}
