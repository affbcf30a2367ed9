//! Per-peer double ratchet session.
//!
//! A session combines a Diffie-Hellman ratchet, which mixes a fresh DH output
//! into the root key whenever the peer presents a new ratchet public key, with
//! two symmetric chains (sending and receiving) that yield one message key
//! per message.
//!
//! # Commit on success
//!
//! [`RatchetSession::encrypt`] and [`RatchetSession::decrypt`] never mutate
//! the session in place while they work. Every change (new root key, chain
//! keys, counters, peer ratchet key, newly skipped keys) is staged in a
//! working copy and published only after the last fallible step succeeded.
//! For decryption that step is AEAD authentication: a tampered or truncated
//! message leaves the session exactly as it was, so the genuine message (or
//! the next one) still decrypts.

use std::fmt;

use duet_crypto::{
    ChainKey, DhKeyPair, DhPublicKey, Iv, KeyFingerprint, MessageKey, RootKey, TAG_SIZE, aead,
    kdf_initial, kdf_root,
};
use duet_proto::{MAX_MESSAGE_SIZE, MessageHeader, WireMessage};

use crate::{
    config::ClientConfig,
    env::SecureRng,
    error::SessionError,
    escrow::{self, EscrowPolicy},
    skipped::SkippedKeys,
};

/// A received message with its header parsed.
///
/// Only built by [`InboundMessage::parse`], so the key, index and IV the
/// ratchet acts on always come from the header bytes that are authenticated
/// as associated data.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender's ratchet public key
    pub(crate) ratchet: DhPublicKey,
    /// Index of the message in the sender's chain
    pub(crate) index: u32,
    /// Length of the sender's previous sending chain
    pub(crate) previous_chain_length: u32,
    /// Message AEAD IV
    pub(crate) iv: Iv,
    message: WireMessage,
}

impl InboundMessage {
    /// Parse and validate the header of a wire message.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation` if the header is malformed, non-canonical, or
    ///   carries a ratchet key that is not a P-384 point
    pub fn parse(message: &WireMessage) -> Result<Self, SessionError> {
        let header = message.decode_header()?;
        let ratchet = DhPublicKey::from_sec1_bytes(&header.ratchet_public_key)
            .map_err(|e| SessionError::violation(format!("ratchet key: {e}")))?;

        Ok(Self {
            ratchet,
            index: header.message_index,
            previous_chain_length: header.previous_chain_length,
            iv: header.message_iv,
            message: message.clone(),
        })
    }
}

/// Ratchet keys and counters. Cloned as the working copy of every operation.
#[derive(Clone)]
pub(crate) struct RatchetState {
    pub(crate) self_ratchet: DhKeyPair,
    pub(crate) peer_ratchet: DhPublicKey,
    pub(crate) root_key: RootKey,
    pub(crate) sending_chain: Option<ChainKey>,
    pub(crate) receiving_chain: Option<ChainKey>,
    pub(crate) send_counter: u32,
    pub(crate) receive_counter: u32,
    pub(crate) previous_chain_length: u32,
}

/// Double ratchet session with one peer.
///
/// # Invariants
///
/// - A chain key is replaced by its successor every time it yields a message
///   key; no chain key ever yields two keys
/// - A sending DH step resets `send_counter` to zero and records the previous
///   value as `previous_chain_length`
/// - A receiving DH step resets `receive_counter` to zero and clears the
///   sending chain, forcing a sending DH step on the next send
/// - On `Err`, neither `encrypt` nor `decrypt` changes the session
pub struct RatchetSession {
    pub(crate) state: RatchetState,
    pub(crate) skipped: SkippedKeys,
}

impl RatchetSession {
    /// Start a session as the first sender.
    ///
    /// Derives the root key and first sending chain from
    /// `DH(identity, peer_identity)` and `DH(ratchet, peer_identity)` for a
    /// fresh ratchet key pair. The receiving chain starts empty and the peer's
    /// identity key stands in for its ratchet key until it replies.
    pub fn initiate(
        identity: &DhKeyPair,
        peer_identity: &DhPublicKey,
        rng: &mut dyn SecureRng,
    ) -> Self {
        let master = identity.diffie_hellman(peer_identity);
        let ratchet = DhKeyPair::generate(rng);
        let second = ratchet.diffie_hellman(peer_identity);
        let (root_key, sending_chain) = kdf_initial(&master, &second);

        Self::from_state(RatchetState {
            self_ratchet: ratchet,
            peer_ratchet: *peer_identity,
            root_key,
            sending_chain: Some(sending_chain),
            receiving_chain: None,
            send_counter: 0,
            receive_counter: 0,
            previous_chain_length: 0,
        })
    }

    /// Start a session as the first receiver.
    ///
    /// Mirrors [`RatchetSession::initiate`] with the ratchet key from the
    /// first received header. The identity key pair serves as the local
    /// ratchet key until this side first sends.
    pub fn respond(
        identity: &DhKeyPair,
        peer_identity: &DhPublicKey,
        peer_ratchet: &DhPublicKey,
    ) -> Self {
        let master = identity.diffie_hellman(peer_identity);
        let second = identity.diffie_hellman(peer_ratchet);
        let (root_key, receiving_chain) = kdf_initial(&master, &second);

        Self::from_state(RatchetState {
            self_ratchet: identity.clone(),
            peer_ratchet: *peer_ratchet,
            root_key,
            sending_chain: None,
            receiving_chain: Some(receiving_chain),
            send_counter: 0,
            receive_counter: 0,
            previous_chain_length: 0,
        })
    }

    pub(crate) fn from_state(state: RatchetState) -> Self {
        Self { state, skipped: SkippedKeys::new() }
    }

    /// Encrypt `plaintext` as the next message to the peer.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation` if the plaintext does not fit a wire message or
    ///   the sending chain is exhausted
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        escrow_policy: &dyn EscrowPolicy,
        rng: &mut dyn SecureRng,
    ) -> Result<WireMessage, SessionError> {
        if plaintext.len() > MAX_MESSAGE_SIZE - TAG_SIZE {
            return Err(SessionError::violation(format!(
                "plaintext of {} bytes exceeds message limit",
                plaintext.len()
            )));
        }

        let mut next = self.state.clone();

        let chain = match next.sending_chain.take() {
            Some(chain) => chain,
            None => {
                let ratchet = DhKeyPair::generate(rng);
                let dh = ratchet.diffie_hellman(&next.peer_ratchet);
                let (root_key, chain) = kdf_root(&next.root_key, &dh);

                tracing::debug!(
                    "New sending chain after {} messages on the previous one",
                    next.send_counter
                );

                next.root_key = root_key;
                next.self_ratchet = ratchet;
                next.previous_chain_length = next.send_counter;
                next.send_counter = 0;
                chain
            },
        };

        let index = next.send_counter;
        let following = index
            .checked_add(1)
            .ok_or_else(|| SessionError::violation("sending chain exhausted"))?;

        let (message_key, successor) = chain.advance();
        next.sending_chain = Some(successor);
        next.send_counter = following;

        let escrow = escrow_policy.wrap(&message_key, rng).map(|package| escrow::to_fields(&package));
        let iv = aead::random_iv(rng);
        let header = MessageHeader {
            ratchet_public_key: next.self_ratchet.public().to_bytes(),
            message_index: index,
            previous_chain_length: next.previous_chain_length,
            escrow,
            message_iv: iv,
        };
        let header_bytes = header.encode()?;
        let ciphertext = aead::seal(message_key.as_bytes(), &iv, plaintext, &header_bytes);

        tracing::trace!("Encrypted message {} (previous chain {})", index, header.previous_chain_length);

        self.state = next;
        Ok(WireMessage::new(header_bytes, ciphertext))
    }

    /// Decrypt a message from the peer.
    ///
    /// Checks the skipped-key cache first, then advances the DH ratchet if
    /// the header carries a new ratchet key, then advances the receiving
    /// chain to the message index, caching every key it passes.
    ///
    /// # Errors
    ///
    /// - `ReplayOrDuplicate` if the index was already consumed on the current
    ///   receiving chain
    /// - `ProtocolViolation` if the header would skip more than
    ///   `config.max_skip` keys, or is inconsistent with the session
    /// - `DecryptionFailure` if authentication fails
    ///
    /// The session is unchanged on every error.
    pub fn decrypt(
        &mut self,
        inbound: &InboundMessage,
        config: &ClientConfig,
    ) -> Result<Vec<u8>, SessionError> {
        let ratchet_id = inbound.ratchet.fingerprint();

        if let Some(key) = self.skipped.get(&ratchet_id, inbound.index) {
            let plaintext = open(key, inbound)?;
            self.skipped.take(&ratchet_id, inbound.index);
            tracing::trace!("Decrypted message {} from skipped keys", inbound.index);
            return Ok(plaintext);
        }

        let mut next = self.state.clone();
        let mut staged = Vec::new();

        if inbound.ratchet == next.peer_ratchet {
            if inbound.index < next.receive_counter {
                return Err(SessionError::ReplayOrDuplicate { index: inbound.index });
            }
        } else {
            let previous_id = next.peer_ratchet.fingerprint();
            skip_until(
                &mut next.receiving_chain,
                &mut next.receive_counter,
                inbound.previous_chain_length,
                previous_id,
                &mut staged,
                config.max_skip,
            )?;

            let dh = next.self_ratchet.diffie_hellman(&inbound.ratchet);
            let (root_key, chain) = kdf_root(&next.root_key, &dh);

            tracing::debug!(
                "DH ratchet step on receive ({} keys cached from the previous chain)",
                staged.len()
            );

            next.root_key = root_key;
            next.receiving_chain = Some(chain);
            next.peer_ratchet = inbound.ratchet;
            next.sending_chain = None;
            next.receive_counter = 0;
        }

        skip_until(
            &mut next.receiving_chain,
            &mut next.receive_counter,
            inbound.index,
            ratchet_id,
            &mut staged,
            config.max_skip,
        )?;

        let Some(chain) = next.receiving_chain.take() else {
            return Err(SessionError::violation("no receiving chain for this ratchet key"));
        };
        let following = inbound
            .index
            .checked_add(1)
            .ok_or_else(|| SessionError::violation("receiving chain exhausted"))?;

        let (message_key, successor) = chain.advance();
        next.receiving_chain = Some(successor);
        next.receive_counter = following;

        let plaintext = open(&message_key, inbound)?;

        self.state = next;
        let mut evicted = 0;
        for (id, index, key) in staged {
            evicted += self.skipped.insert(id, index, key, config.max_skipped_keys);
        }
        if evicted > 0 {
            tracing::warn!("Evicted {} skipped keys over the cache limit", evicted);
        }

        tracing::trace!("Decrypted message {}", inbound.index);
        Ok(plaintext)
    }

    /// Current local ratchet public key.
    pub fn ratchet_public_key(&self) -> &DhPublicKey {
        self.state.self_ratchet.public()
    }

    /// Most recently observed peer ratchet public key.
    pub fn peer_ratchet_public_key(&self) -> &DhPublicKey {
        &self.state.peer_ratchet
    }

    /// Messages sent on the current sending chain.
    pub fn send_counter(&self) -> u32 {
        self.state.send_counter
    }

    /// Messages received on the current receiving chain.
    pub fn receive_counter(&self) -> u32 {
        self.state.receive_counter
    }

    /// Length of the previous sending chain.
    pub fn previous_chain_length(&self) -> u32 {
        self.state.previous_chain_length
    }

    /// Whether a sending chain exists. `false` means the next send performs
    /// a DH ratchet step.
    pub fn has_sending_chain(&self) -> bool {
        self.state.sending_chain.is_some()
    }

    /// Whether a receiving chain exists.
    pub fn has_receiving_chain(&self) -> bool {
        self.state.receiving_chain.is_some()
    }

    /// Number of cached skipped keys.
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    /// Whether a skipped key is cached for `(ratchet, index)`.
    pub fn has_skipped_key(&self, ratchet: &KeyFingerprint, index: u32) -> bool {
        self.skipped.contains(ratchet, index)
    }
}

impl fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetSession")
            .field("ratchet", self.ratchet_public_key())
            .field("peer_ratchet", &self.state.peer_ratchet)
            .field("send_counter", &self.state.send_counter)
            .field("receive_counter", &self.state.receive_counter)
            .field("previous_chain_length", &self.state.previous_chain_length)
            .field("skipped", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

/// Advance `chain` until `counter == until`, staging every passed key.
///
/// A no-op when `until <= counter`. Fails without side effects on the
/// caller's real session, since `chain` and `counter` belong to the working
/// copy.
fn skip_until(
    chain: &mut Option<ChainKey>,
    counter: &mut u32,
    until: u32,
    ratchet_id: KeyFingerprint,
    staged: &mut Vec<(KeyFingerprint, u32, MessageKey)>,
    max_skip: u32,
) -> Result<(), SessionError> {
    if until <= *counter {
        return Ok(());
    }

    let gap = until - *counter;
    if gap > max_skip {
        tracing::warn!("Header skips {} messages (limit {})", gap, max_skip);
        return Err(SessionError::violation(format!(
            "header skips {gap} messages, limit is {max_skip}"
        )));
    }

    let Some(mut current) = chain.take() else {
        return Err(SessionError::violation("header skips messages on a chain that does not exist"));
    };

    while *counter < until {
        let (key, successor) = current.advance();
        staged.push((ratchet_id, *counter, key));
        current = successor;
        *counter += 1;
    }

    *chain = Some(current);
    Ok(())
}

fn open(key: &MessageKey, inbound: &InboundMessage) -> Result<Vec<u8>, SessionError> {
    let message = &inbound.message;
    aead::open(key.as_bytes(), &inbound.iv, &message.ciphertext, &message.header)
        .map_err(|_| SessionError::DecryptionFailure)
}
