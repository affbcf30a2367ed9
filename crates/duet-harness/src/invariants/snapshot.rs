//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks. No key material is captured; ratchet keys
//! appear only as fingerprints.

use std::collections::{HashMap, HashSet};

use duet_core::RatchetSession;
use duet_crypto::KeyFingerprint;

/// Snapshot of the entire system state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    /// Client name.
    pub name: String,
    /// Configured skipped-key cap per session.
    pub max_skipped_keys: usize,
    /// Usernames with a verified certificate.
    pub certified: HashSet<String>,
    /// Sessions by peer.
    pub sessions: HashMap<String, SessionSnapshot>,
    /// `(peer ratchet fingerprint, receive counter)` after every successful
    /// receive, per peer.
    pub receive_history: HashMap<String, Vec<(KeyFingerprint, u32)>>,
}

impl ClientSnapshot {
    /// Create a client snapshot without sessions.
    pub fn new(name: impl Into<String>, max_skipped_keys: usize) -> Self {
        Self { name: name.into(), max_skipped_keys, ..Default::default() }
    }

    /// Add a session to the snapshot.
    pub fn with_session(mut self, peer: impl Into<String>, session: SessionSnapshot) -> Self {
        self.sessions.insert(peer.into(), session);
        self
    }

    /// Record the receive position after a successful receive.
    pub fn record_receive(&mut self, peer: &str, ratchet: KeyFingerprint, counter: u32) {
        self.receive_history.entry(peer.to_owned()).or_default().push((ratchet, counter));
    }
}

/// Snapshot of one ratchet session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Fingerprint of the local ratchet public key.
    pub ratchet: KeyFingerprint,
    /// Fingerprint of the peer ratchet public key.
    pub peer_ratchet: KeyFingerprint,
    /// Messages sent on the current sending chain.
    pub send_counter: u32,
    /// Messages received on the current receiving chain.
    pub receive_counter: u32,
    /// Length of the previous sending chain.
    pub previous_chain_length: u32,
    /// Cached skipped keys.
    pub skipped: usize,
    /// Whether a sending chain exists.
    pub has_sending_chain: bool,
    /// Whether a receiving chain exists.
    pub has_receiving_chain: bool,
}

impl SessionSnapshot {
    /// Capture the observable state of `session`.
    pub fn capture(session: &RatchetSession) -> Self {
        Self {
            ratchet: session.ratchet_public_key().fingerprint(),
            peer_ratchet: session.peer_ratchet_public_key().fingerprint(),
            send_counter: session.send_counter(),
            receive_counter: session.receive_counter(),
            previous_chain_length: session.previous_chain_length(),
            skipped: session.skipped_len(),
            has_sending_chain: session.has_sending_chain(),
            has_receiving_chain: session.has_receiving_chain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.clients.is_empty());
    }

    #[test]
    fn client_snapshot_builder() {
        let session = SessionSnapshot { send_counter: 3, skipped: 2, ..Default::default() };
        let mut client = ClientSnapshot::new("alice", 10).with_session("bob", session.clone());
        client.record_receive("bob", [1; 32], 4);

        assert_eq!(client.name, "alice");
        assert_eq!(client.sessions["bob"], session);
        assert_eq!(client.receive_history["bob"], vec![([1; 32], 4)]);
    }
}
