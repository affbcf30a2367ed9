//! Session store addressed by peer name.

use std::collections::HashMap;

use crate::session::RatchetSession;

/// All ratchet sessions of one client.
///
/// # Invariants
///
/// - At most one session per peer name
/// - A session enters the store only through [`SessionStore::commit`], after
///   the operation that created or advanced it succeeded
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, RatchetSession>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with `peer`. `None` if no message has been exchanged yet.
    pub fn get(&self, peer: &str) -> Option<&RatchetSession> {
        self.sessions.get(peer)
    }

    pub(crate) fn get_mut(&mut self, peer: &str) -> Option<&mut RatchetSession> {
        self.sessions.get_mut(peer)
    }

    /// Check if a session with `peer` exists.
    pub fn contains(&self, peer: &str) -> bool {
        self.sessions.contains_key(peer)
    }

    /// Store `session` for `peer`, replacing any previous one.
    pub fn commit(&mut self, peer: impl Into<String>, session: RatchetSession) {
        self.sessions.insert(peer.into(), session);
    }

    /// Peer names with a session, in no particular order.
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Iterate over `(peer, session)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RatchetSession)> {
        self.sessions.iter().map(|(peer, session)| (peer.as_str(), session))
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
