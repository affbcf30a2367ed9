//! Deterministic simulation harness for duet session testing.
//!
//! Seeded implementations of the environment and a fault-injecting transport
//! for reproducible tests under reordering, duplication, loss and tampering.
//!
//! # Fixtures
//!
//! [`Fixture`] wires one certificate authority, one escrow agent and any
//! number of named clients that already hold each other's verified
//! certificates. Every key in the fixture is derived from its seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the session
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixture;
pub mod invariants;
pub mod sim_env;
pub mod sim_network;

pub use fixture::{Fixture, FixtureOptions};
pub use invariants::{
    CertifiedPeers, ChainPresence, ClientSnapshot, Invariant, InvariantRegistry, InvariantResult,
    ReceiveCounterMonotonicity, SessionSnapshot, SkippedKeyBound, SystemSnapshot, Violation,
};
pub use sim_env::SimEnv;
pub use sim_network::{Delivery, Envelope, FaultConfig, SimNetwork, flip_bit};
