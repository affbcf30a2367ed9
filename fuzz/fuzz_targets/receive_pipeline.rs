//! Fuzz target for the receive pipeline (decode → ratchet → AEAD → commit)
//!
//! # Strategy
//!
//! - Two clients exchange genuine messages in fuzzer-chosen order
//! - Genuine messages are replayed, truncated and bit-flipped
//! - Raw bytes are fed to the receiver as if they were messages
//!
//! # Invariants
//!
//! - A genuine message decrypts at most once, and only to its plaintext
//! - Failed receives never change session state
//! - Mutated or raw inputs never decrypt
//! - Standard harness invariants hold after every step

#![no_main]

use arbitrary::Arbitrary;
use duet_harness::{Fixture, InvariantRegistry, SessionSnapshot};
use duet_proto::WireMessage;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Send { from_bob: bool, len: u8 },
    Deliver { pick: u8 },
    Replay { pick: u8 },
    Flip { pick: u8, position: u16, bit: u8 },
    Truncate { pick: u8, keep: u16 },
    Raw { to_bob: bool, bytes: Vec<u8> },
}

struct Sent {
    from: &'static str,
    to: &'static str,
    message: WireMessage,
    plaintext: Vec<u8>,
    delivered: bool,
}

fn names(from_bob: bool) -> (&'static str, &'static str) {
    if from_bob { ("bob", "alice") } else { ("alice", "bob") }
}

fn snapshot(fixture: &Fixture, to: &str, from: &str) -> Option<SessionSnapshot> {
    fixture.client(to).session(from).map(SessionSnapshot::capture)
}

fn reject(fixture: &mut Fixture, to: &str, from: &str, message: &WireMessage) {
    let before = snapshot(fixture, to, from);
    assert!(fixture.receive(to, from, message).is_err(), "mutated message accepted");
    assert_eq!(snapshot(fixture, to, from), before, "rejected message changed state");
}

fuzz_target!(|scenario: Scenario| {
    let mut fixture = Fixture::new(scenario.seed, &["alice", "bob"]);
    let mut sent: Vec<Sent> = Vec::new();

    // Alice opens so that Bob never initiates a competing session.
    let opener = fixture.send("alice", "bob", b"opener").expect("first send");
    fixture.receive("bob", "alice", &opener).expect("first receive");

    for op in scenario.ops.into_iter().take(64) {
        if sent.is_empty() && !matches!(op, Op::Send { .. } | Op::Raw { .. }) {
            continue;
        }

        match op {
            Op::Send { from_bob, len } => {
                let (from, to) = names(from_bob);
                let plaintext = vec![len; usize::from(len)];
                let message = fixture.send(from, to, &plaintext).expect("send");
                sent.push(Sent { from, to, message, plaintext, delivered: false });
            },
            Op::Deliver { pick } => {
                let index = usize::from(pick) % sent.len();
                let entry = &sent[index];
                let (to, from) = (entry.to, entry.from);
                let before = snapshot(&fixture, to, from);

                // Out-of-order delivery across a missed ratchet turn cannot
                // decrypt, so a genuine first delivery may still fail.
                match fixture.receive(to, from, &entry.message) {
                    Ok(plaintext) => {
                        assert!(!entry.delivered, "duplicate accepted");
                        assert_eq!(plaintext, entry.plaintext);
                        sent[index].delivered = true;
                    },
                    Err(_) => {
                        assert_eq!(snapshot(&fixture, to, from), before, "failed receive changed state");
                    },
                }
            },
            Op::Replay { pick } => {
                let entry = &sent[usize::from(pick) % sent.len()];
                if entry.delivered {
                    let message = entry.message.clone();
                    let (to, from) = (entry.to, entry.from);
                    reject(&mut fixture, to, from, &message);
                }
            },
            Op::Flip { pick, position, bit } => {
                let entry = &sent[usize::from(pick) % sent.len()];
                let mut header = entry.message.header.to_vec();
                let mut ciphertext = entry.message.ciphertext.to_vec();
                let at = usize::from(position) % (header.len() + ciphertext.len());
                if at < header.len() {
                    header[at] ^= 1 << (bit % 8);
                } else {
                    ciphertext[at - header.len()] ^= 1 << (bit % 8);
                }
                let (to, from) = (entry.to, entry.from);
                reject(&mut fixture, to, from, &WireMessage::new(header, ciphertext));
            },
            Op::Truncate { pick, keep } => {
                let entry = &sent[usize::from(pick) % sent.len()];
                let ciphertext = &entry.message.ciphertext;
                let keep = usize::from(keep) % ciphertext.len();
                let truncated =
                    WireMessage::new(entry.message.header.clone(), ciphertext.slice(..keep));
                let (to, from) = (entry.to, entry.from);
                reject(&mut fixture, to, from, &truncated);
            },
            Op::Raw { to_bob, bytes } => {
                let (from, to) = names(!to_bob);
                if let Ok(message) = WireMessage::decode(&bytes) {
                    reject(&mut fixture, to, from, &message);
                }
            },
        }

        InvariantRegistry::standard().assert_all(&fixture.snapshot(), "after fuzz op");
    }
});
