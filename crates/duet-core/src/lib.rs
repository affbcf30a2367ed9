//! Duet Session Engine
//!
//! Pairwise end-to-end encrypted sessions built on a double ratchet. Each
//! [`Client`] holds one identity key, trusts peer identity keys only through
//! certificates signed by a single authority, and keeps one
//! [`RatchetSession`] per peer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Client<E>                                            │
//! │   CertificateVerifier ── authority key + cache       │
//! │   SessionStore ───────── peer -> RatchetSession      │
//! │   EscrowPolicy ───────── wraps every message key     │
//! └──────────────────────────────────────────────────────┘
//!          │ send_message / receive_message
//!          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ RatchetSession                                       │
//! │   DH ratchet + sending / receiving chains            │
//! │   SkippedKeys ── bounded out-of-order cache          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Transport is out of scope: callers move [`WireMessage`] values between
//! clients however they like, in any order, with duplicates and losses.
//!
//! # Failure Semantics
//!
//! Every fallible operation is all-or-nothing. A message that fails to
//! authenticate leaves the session bit-for-bit unchanged, so an attacker who
//! injects garbage cannot desynchronize two honest peers.
//!
//! [`WireMessage`]: duet_proto::WireMessage

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificates;
pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod escrow;
pub mod session;
pub mod shared;
pub mod skipped;
pub mod state;
pub mod store;

pub use certificates::{CertificateVerifier, VerifiedCertificate};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_MAX_SKIP, DEFAULT_MAX_SKIPPED_KEYS};
pub use env::{EnvRng, Environment, SecureRng, SystemEnv};
pub use error::{SessionError, StateError};
pub use escrow::{EscrowPolicy, FixedKeyEscrow, NoEscrow};
pub use session::{InboundMessage, RatchetSession};
pub use shared::SharedClient;
pub use skipped::SkippedKeys;
pub use state::{
    STATE_VERSION, SealedState, SessionSummary, StateSummary, export_state, import_state,
    open_state, seal_state, summarize_state,
};
pub use store::SessionStore;
