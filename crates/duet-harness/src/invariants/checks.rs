//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Skipped-key caches never exceed the configured cap.
///
/// Eviction runs on every insert, so a cache above the cap means an insert
/// path bypassed it.
pub struct SkippedKeyBound;

impl Invariant for SkippedKeyBound {
    fn name(&self) -> &'static str {
        "SkippedKeyBound"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (peer, session) in &client.sessions {
                if session.skipped > client.max_skipped_keys {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} peer {}: {} skipped keys, cap {}",
                            client.name, peer, session.skipped, client.max_skipped_keys
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every session peer has a verified certificate.
///
/// Sessions are only ever created from a cached certificate, and import
/// re-verifies the cache. A session without one used an unverified key.
pub struct CertifiedPeers;

impl Invariant for CertifiedPeers {
    fn name(&self) -> &'static str {
        "CertifiedPeers"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for peer in client.sessions.keys() {
                if !client.certified.contains(peer) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: session with {} has no verified certificate",
                            client.name, peer
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every session has a sending chain, a receiving chain, or both.
///
/// The initiator starts with a sending chain, the responder with a receiving
/// chain, and no transition clears both.
pub struct ChainPresence;

impl Invariant for ChainPresence {
    fn name(&self) -> &'static str {
        "ChainPresence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (peer, session) in &client.sessions {
                if !session.has_sending_chain && !session.has_receiving_chain {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {} peer {}: no chain at all", client.name, peer),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Receive counters never decrease while the peer ratchet key is unchanged.
///
/// A decrease would mean a chain key was rewound, which is how message keys
/// get reused.
pub struct ReceiveCounterMonotonicity;

impl Invariant for ReceiveCounterMonotonicity {
    fn name(&self) -> &'static str {
        "ReceiveCounterMonotonicity"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (peer, history) in &client.receive_history {
                for window in history.windows(2) {
                    let (before_ratchet, before) = window[0];
                    let (after_ratchet, after) = window[1];
                    if before_ratchet == after_ratchet && after < before {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {} peer {}: receive counter decreased {} → {}",
                                client.name, peer, before, after
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
