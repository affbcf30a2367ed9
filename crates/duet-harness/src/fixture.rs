//! Test fixture wiring an authority, an escrow agent and named clients.

#![allow(clippy::panic, reason = "Fixture lookups fail the test loudly")]

use std::{collections::HashMap, sync::Arc};

use duet_core::{
    Client, ClientConfig, EnvRng, Environment, EscrowPolicy, FixedKeyEscrow, NoEscrow,
    SessionError, StateError, escrow, export_state, import_state,
};
use duet_crypto::{AuthoritySigningKey, DhKeyPair, KeyFingerprint, MessageKey};
use duet_proto::{SignedCertificate, WireMessage};

use crate::{
    invariants::{ClientSnapshot, SessionSnapshot, SystemSnapshot},
    sim_env::SimEnv,
};

/// Options for [`Fixture::with_options`].
#[derive(Debug, Clone, Copy)]
pub struct FixtureOptions {
    /// Escrow every message key to the fixture's escrow agent
    pub escrow: bool,
    /// Limits applied to every client
    pub config: ClientConfig,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self { escrow: true, config: ClientConfig::default() }
    }
}

type ReceiveHistory = HashMap<String, Vec<(KeyFingerprint, u32)>>;

/// A small world: one authority, one escrow agent, and clients that hold
/// verified certificates for each other.
pub struct Fixture {
    env: SimEnv,
    authority: AuthoritySigningKey,
    escrow_agent: DhKeyPair,
    escrow_policy: Arc<dyn EscrowPolicy>,
    config: ClientConfig,
    clients: HashMap<String, Client<SimEnv>>,
    certificates: HashMap<String, SignedCertificate>,
    histories: HashMap<String, ReceiveHistory>,
}

impl Fixture {
    /// Fixture with escrow enabled and default limits.
    pub fn new(seed: u64, names: &[&str]) -> Self {
        Self::with_options(seed, names, FixtureOptions::default())
    }

    /// Fixture with explicit options.
    ///
    /// Every client generates an identity, has it signed by the authority,
    /// and receives the certificate of every other client.
    pub fn with_options(seed: u64, names: &[&str], options: FixtureOptions) -> Self {
        let env = SimEnv::with_seed(seed);
        let authority = AuthoritySigningKey::generate(&mut EnvRng::new(&env));
        let escrow_agent = DhKeyPair::generate(&mut EnvRng::new(&env));
        let escrow_policy: Arc<dyn EscrowPolicy> = if options.escrow {
            Arc::new(FixedKeyEscrow::new(*escrow_agent.public()))
        } else {
            Arc::new(NoEscrow)
        };

        let mut fixture = Self {
            env,
            authority,
            escrow_agent,
            escrow_policy,
            config: options.config,
            clients: HashMap::new(),
            certificates: HashMap::new(),
            histories: HashMap::new(),
        };

        for name in names {
            fixture.enroll(name);
        }
        for name in names {
            fixture.introduce_all(name);
        }

        fixture
    }

    /// Add a client and sign its certificate. The certificate is not yet
    /// distributed; see [`Fixture::introduce`].
    pub fn enroll(&mut self, name: &str) -> SignedCertificate {
        let mut client = Client::new(
            self.env.fork(),
            self.authority.public_key(),
            Arc::clone(&self.escrow_policy),
            self.config,
        );
        let certificate = client.generate_certificate(name);
        let signed = self.sign(certificate);

        self.clients.insert(name.to_owned(), client);
        self.certificates.insert(name.to_owned(), signed.clone());
        signed
    }

    /// Give `to` the certificate of `whom`.
    ///
    /// # Panics
    ///
    /// Panics if either name is unknown or the certificate is rejected.
    pub fn introduce(&mut self, to: &str, whom: &str) {
        let signed = self.certificate(whom).clone();
        let result = self.client_mut(to).receive_certificate(&signed);
        assert!(result.is_ok(), "certificate for {whom} rejected by {to}: {result:?}");
    }

    fn introduce_all(&mut self, to: &str) {
        let others: Vec<String> =
            self.certificates.keys().filter(|name| *name != to).cloned().collect();
        for whom in others {
            self.introduce(to, &whom);
        }
    }

    /// Sign `certificate` with the fixture authority.
    ///
    /// # Panics
    ///
    /// Panics if the certificate cannot be encoded.
    pub fn sign(&self, certificate: duet_proto::Certificate) -> SignedCertificate {
        let Ok(message) = certificate.canonical_bytes() else {
            panic!("certificate for {} cannot be encoded", certificate.username);
        };
        let signature = self.authority.sign(&message);
        SignedCertificate { certificate, signature }
    }

    /// Authority signing key.
    pub fn authority(&self) -> &AuthoritySigningKey {
        &self.authority
    }

    /// Escrow agent key pair.
    pub fn escrow_agent(&self) -> &DhKeyPair {
        &self.escrow_agent
    }

    /// Signed certificate of `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is unknown.
    pub fn certificate(&self, name: &str) -> &SignedCertificate {
        let Some(signed) = self.certificates.get(name) else {
            panic!("no certificate for {name}");
        };
        signed
    }

    /// Client named `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is unknown.
    pub fn client(&self, name: &str) -> &Client<SimEnv> {
        let Some(client) = self.clients.get(name) else {
            panic!("no client named {name}");
        };
        client
    }

    /// Mutable client named `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is unknown.
    pub fn client_mut(&mut self, name: &str) -> &mut Client<SimEnv> {
        let Some(client) = self.clients.get_mut(name) else {
            panic!("no client named {name}");
        };
        client
    }

    /// `from` encrypts `plaintext` for `to`.
    ///
    /// # Errors
    ///
    /// Whatever [`Client::send_message`] returns.
    pub fn send(
        &mut self,
        from: &str,
        to: &str,
        plaintext: &[u8],
    ) -> Result<WireMessage, SessionError> {
        self.client_mut(from).send_message(to, plaintext)
    }

    /// `to` decrypts `message` as coming from `from`.
    ///
    /// # Errors
    ///
    /// Whatever [`Client::receive_message`] returns.
    pub fn receive(
        &mut self,
        to: &str,
        from: &str,
        message: &WireMessage,
    ) -> Result<Vec<u8>, SessionError> {
        let plaintext = self.client_mut(to).receive_message(from, message)?;

        let position = self
            .client(to)
            .session(from)
            .map(|session| (session.peer_ratchet_public_key().fingerprint(), session.receive_counter()));
        if let Some(position) = position {
            self.histories
                .entry(to.to_owned())
                .or_default()
                .entry(from.to_owned())
                .or_default()
                .push(position);
        }
        Ok(plaintext)
    }

    /// Export the state of `name`.
    ///
    /// # Errors
    ///
    /// Whatever [`export_state`] returns.
    pub fn export(&self, name: &str) -> Result<Vec<u8>, StateError> {
        export_state(self.client(name)).map(|bytes| bytes.to_vec())
    }

    /// Replace client `name` with one imported from `bytes`.
    ///
    /// Clears the receive history of `name`, since restoring an older
    /// export legitimately rewinds its counters.
    ///
    /// # Errors
    ///
    /// Whatever [`import_state`] returns; the current client is kept.
    pub fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<(), StateError> {
        let client = import_state(
            self.env.fork(),
            self.authority.public_key(),
            Arc::clone(&self.escrow_policy),
            self.config,
            bytes,
        )?;
        self.clients.insert(name.to_owned(), client);
        self.histories.remove(name);
        Ok(())
    }

    /// Recover the message key of `message` with the escrow agent's key.
    ///
    /// Returns `None` if the header carries no escrow package or the package
    /// does not open.
    pub fn unescrow(&self, message: &WireMessage) -> Option<MessageKey> {
        let header = message.decode_header().ok()?;
        let package = escrow::from_fields(header.escrow.as_ref()?).ok()?;
        duet_crypto::escrow::open(&package, &self.escrow_agent).ok()
    }

    /// Observable state of every client.
    pub fn snapshot(&self) -> SystemSnapshot {
        let mut names: Vec<&String> = self.clients.keys().collect();
        names.sort();

        SystemSnapshot::from_clients(
            names
                .into_iter()
                .map(|name| {
                    let client = &self.clients[name];
                    let mut snapshot =
                        ClientSnapshot::new(name.clone(), client.config().max_skipped_keys);
                    snapshot.certified = client
                        .certificates()
                        .iter()
                        .map(|verified| verified.username().to_owned())
                        .collect();
                    for (peer, session) in client.sessions().iter() {
                        snapshot.sessions.insert(peer.to_owned(), SessionSnapshot::capture(session));
                    }
                    if let Some(history) = self.histories.get(name) {
                        snapshot.receive_history.clone_from(history);
                    }
                    snapshot
                })
                .collect(),
        )
    }

    /// Random `u64` from the fixture environment.
    pub fn random_u64(&self) -> u64 {
        self.env.random_u64()
    }
}
