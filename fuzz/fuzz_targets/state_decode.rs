//! Fuzz target for state document parsing
//!
//! Arbitrary bytes as plain and sealed state documents. Import must reject
//! garbage with an error, never a panic, and a summary must exist for every
//! document that imports.

#![no_main]

use std::sync::Arc;

use duet_core::{ClientConfig, EnvRng, NoEscrow, SealedState, import_state, summarize_state};
use duet_crypto::AuthoritySigningKey;
use duet_harness::SimEnv;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let env = SimEnv::with_seed(0);
    let authority = AuthoritySigningKey::generate(&mut EnvRng::new(&env));

    let summary = summarize_state(data);
    let imported =
        import_state(env, authority.public_key(), Arc::new(NoEscrow), ClientConfig::default(), data);
    if imported.is_ok() {
        assert!(summary.is_ok(), "imported a document that does not summarize");
    }

    let _ = SealedState::decode(data);
});
