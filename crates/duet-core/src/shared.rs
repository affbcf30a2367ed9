//! Client shared between tasks.

use std::sync::Arc;

use duet_proto::{SignedCertificate, WireMessage};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::{
    client::Client,
    env::Environment,
    error::{SessionError, StateError},
    state,
};

/// Cloneable handle to one [`Client`] behind an async mutex.
///
/// Every operation holds the lock for its entire ratchet step, including
/// first-contact session creation. Two tasks sending to the same peer at once
/// therefore never observe the same chain key.
pub struct SharedClient<E: Environment> {
    inner: Arc<Mutex<Client<E>>>,
}

impl<E: Environment> Clone for SharedClient<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: Environment> SharedClient<E> {
    /// Wrap `client`.
    pub fn new(client: Client<E>) -> Self {
        Self { inner: Arc::new(Mutex::new(client)) }
    }

    /// See [`Client::receive_certificate`].
    pub async fn receive_certificate(&self, signed: &SignedCertificate) -> Result<(), SessionError> {
        self.inner.lock().await.receive_certificate(signed)
    }

    /// See [`Client::send_message`].
    pub async fn send_message(
        &self,
        peer: &str,
        plaintext: &[u8],
    ) -> Result<WireMessage, SessionError> {
        self.inner.lock().await.send_message(peer, plaintext)
    }

    /// See [`Client::receive_message`].
    pub async fn receive_message(
        &self,
        peer: &str,
        message: &WireMessage,
    ) -> Result<Vec<u8>, SessionError> {
        self.inner.lock().await.receive_message(peer, message)
    }

    /// Export the client's state under the lock. See [`state::export_state`].
    pub async fn export_state(&self) -> Result<Zeroizing<Vec<u8>>, StateError> {
        state::export_state(&*self.inner.lock().await)
    }

    /// Run `f` with exclusive access to the client.
    pub async fn with_client<R>(&self, f: impl FnOnce(&mut Client<E>) -> R) -> R {
        f(&mut *self.inner.lock().await)
    }
}
