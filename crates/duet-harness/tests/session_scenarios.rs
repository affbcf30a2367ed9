//! End-to-end session scenarios between fixture clients.
//!
//! Each test drives real clients through a fixed delivery schedule and checks
//! the plaintexts, the error classification, and the standard invariants.

use duet_core::{ClientConfig, SessionError};
use duet_crypto::aead;
use duet_harness::{Fixture, FixtureOptions, InvariantRegistry, SessionSnapshot, flip_bit};
use duet_proto::WireMessage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn send_batch(fixture: &mut Fixture, from: &str, to: &str, count: u8) -> Vec<WireMessage> {
    (0..count).map(|i| fixture.send(from, to, &[i]).unwrap()).collect()
}

fn check(fixture: &Fixture, context: &str) {
    InvariantRegistry::standard().assert_all(&fixture.snapshot(), context);
}

#[test]
fn in_order_delivery() {
    let mut fixture = Fixture::new(1, &["alice", "bob"]);
    let messages = send_batch(&mut fixture, "alice", "bob", 10);

    for (i, message) in messages.iter().enumerate() {
        assert_eq!(fixture.receive("bob", "alice", message).unwrap(), vec![i as u8]);
    }

    let session = fixture.client("bob").session("alice").unwrap();
    assert_eq!(session.receive_counter(), 10);
    assert_eq!(session.skipped_len(), 0);
    check(&fixture, "after in-order delivery");
}

#[test]
fn reverse_order_delivery() {
    let mut fixture = Fixture::new(2, &["alice", "bob"]);
    let messages = send_batch(&mut fixture, "alice", "bob", 10);

    for (i, message) in messages.iter().enumerate().rev() {
        assert_eq!(fixture.receive("bob", "alice", message).unwrap(), vec![i as u8]);
        check(&fixture, "during reverse delivery");
    }

    assert_eq!(fixture.client("bob").session("alice").unwrap().skipped_len(), 0);
}

#[test]
fn duplicate_delivery_is_replay() {
    let mut fixture = Fixture::new(3, &["alice", "bob"]);
    let messages = send_batch(&mut fixture, "alice", "bob", 3);
    for message in &messages {
        fixture.receive("bob", "alice", message).unwrap();
    }

    let before = fixture.client("bob").session("alice").unwrap().receive_counter();
    let result = fixture.receive("bob", "alice", &messages[1]);

    assert_eq!(result, Err(SessionError::ReplayOrDuplicate { index: 1 }));
    assert!(result.unwrap_err().should_drop());
    assert_eq!(fixture.client("bob").session("alice").unwrap().receive_counter(), before);
}

#[test]
fn tampered_message_then_next_message_decrypts() {
    let mut fixture = Fixture::new(4, &["alice", "bob"]);
    let opener = fixture.send("alice", "bob", b"opener").unwrap();
    fixture.receive("bob", "alice", &opener).unwrap();

    let target = fixture.send("alice", "bob", b"target").unwrap();
    let next = fixture.send("alice", "bob", b"next").unwrap();

    let mut flipped_ciphertext = target.ciphertext.to_vec();
    flipped_ciphertext[5] ^= 0x04;
    let tampered = WireMessage::new(target.header.clone(), flipped_ciphertext);

    assert_eq!(fixture.receive("bob", "alice", &tampered), Err(SessionError::DecryptionFailure));
    assert_eq!(fixture.receive("bob", "alice", &next).unwrap(), b"next");
    assert_eq!(fixture.receive("bob", "alice", &target).unwrap(), b"target");
    check(&fixture, "after tamper and recovery");
}

#[test]
fn tampered_header_is_rejected() {
    let mut fixture = Fixture::new(5, &["alice", "bob"]);
    let opener = fixture.send("alice", "bob", b"opener").unwrap();
    fixture.receive("bob", "alice", &opener).unwrap();

    let target = fixture.send("alice", "bob", b"target").unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(5);

    for _ in 0..32 {
        let mut header = target.header.to_vec();
        let position = rng.gen_range(0..header.len());
        header[position] ^= 1u8 << rng.gen_range(0..8u32);
        let tampered = WireMessage::new(header, target.ciphertext.clone());

        let result = fixture.receive("bob", "alice", &tampered);
        assert!(result.is_err(), "tampered header accepted");
        assert_eq!(fixture.client("bob").session("alice").unwrap().receive_counter(), 1);
    }

    assert_eq!(fixture.receive("bob", "alice", &target).unwrap(), b"target");
}

#[test]
fn header_field_flip_fails_authentication() {
    let mut fixture = Fixture::new(25, &["alice", "bob"]);
    let opener = fixture.send("alice", "bob", b"opener").unwrap();
    fixture.receive("bob", "alice", &opener).unwrap();

    let target = fixture.send("alice", "bob", b"target").unwrap();
    let next = fixture.send("alice", "bob", b"next").unwrap();
    let header = target.decode_header().unwrap();

    let mut iv_flipped = header.clone();
    iv_flipped.message_iv[0] ^= 0x01;

    let mut escrow_flipped = header.clone();
    escrow_flipped.escrow.as_mut().unwrap().ciphertext[0] ^= 0x01;

    let mut chain_length_flipped = header.clone();
    chain_length_flipped.previous_chain_length ^= 0x01;

    let forgeries = [
        ("message_iv", iv_flipped),
        ("escrow", escrow_flipped),
        ("previous_chain_length", chain_length_flipped),
    ];
    for (field, forged) in forgeries {
        let tampered = WireMessage::new(forged.encode().unwrap(), target.ciphertext.clone());
        let before = SessionSnapshot::capture(fixture.client("bob").session("alice").unwrap());

        assert_eq!(
            fixture.receive("bob", "alice", &tampered),
            Err(SessionError::DecryptionFailure),
            "{field} flip"
        );
        assert_eq!(
            SessionSnapshot::capture(fixture.client("bob").session("alice").unwrap()),
            before,
            "{field} flip changed the session"
        );
    }

    assert_eq!(fixture.receive("bob", "alice", &next).unwrap(), b"next");
    assert_eq!(fixture.receive("bob", "alice", &target).unwrap(), b"target");
    check(&fixture, "after header field flips");
}

#[test]
fn ratchet_turns_rotate_keys_both_ways() {
    let mut fixture = Fixture::new(6, &["alice", "bob"]);
    let mut alice_keys = Vec::new();
    let mut bob_keys = Vec::new();

    for round in 0..5u8 {
        let to_bob = fixture.send("alice", "bob", &[round]).unwrap();
        alice_keys.push(to_bob.decode_header().unwrap().ratchet_public_key);
        assert_eq!(fixture.receive("bob", "alice", &to_bob).unwrap(), vec![round]);

        let to_alice = fixture.send("bob", "alice", &[round]).unwrap();
        bob_keys.push(to_alice.decode_header().unwrap().ratchet_public_key);
        assert_eq!(fixture.receive("alice", "bob", &to_alice).unwrap(), vec![round]);

        check(&fixture, "during ping-pong");
    }

    alice_keys.dedup();
    bob_keys.dedup();
    assert_eq!(alice_keys.len(), 5);
    assert_eq!(bob_keys.len(), 5);
}

/// Alice sends 0..=2 under her first ratchet key. Bob takes 0 and 1 (1
/// first, so 0 comes out of the skipped cache), then replies, moving to a
/// new ratchet key of his own. Alice keeps sending under her first key
/// because she has not read the reply. Message 2 then decrypts identically
/// whether it arrives in order or after message 3 pushed it into the cache.
#[test]
fn late_message_decrypts_identically_on_both_paths() {
    let mut fixture = Fixture::new(7, &["alice", "bob"]);
    let m0 = fixture.send("alice", "bob", b"m0").unwrap();
    let m1 = fixture.send("alice", "bob", b"m1").unwrap();
    let m2 = fixture.send("alice", "bob", b"m2").unwrap();
    let first_key = m0.decode_header().unwrap().ratchet_public_key;

    assert_eq!(fixture.receive("bob", "alice", &m1).unwrap(), b"m1");
    assert_eq!(fixture.receive("bob", "alice", &m0).unwrap(), b"m0");

    let reply = fixture.send("bob", "alice", b"reply").unwrap();
    let m3 = fixture.send("alice", "bob", b"m3").unwrap();
    assert_eq!(m3.decode_header().unwrap().ratchet_public_key, first_key);
    assert_eq!(m3.decode_header().unwrap().message_index, 3);

    let checkpoint = fixture.export("bob").unwrap();

    let direct = fixture.receive("bob", "alice", &m2).unwrap();
    assert_eq!(fixture.receive("bob", "alice", &m3).unwrap(), b"m3");

    fixture.restore("bob", &checkpoint).unwrap();
    assert_eq!(fixture.receive("bob", "alice", &m3).unwrap(), b"m3");
    assert_eq!(fixture.client("bob").session("alice").unwrap().skipped_len(), 1);
    let cached = fixture.receive("bob", "alice", &m2).unwrap();

    assert_eq!(direct, cached);
    assert_eq!(direct, b"m2");

    assert_eq!(fixture.receive("alice", "bob", &reply).unwrap(), b"reply");
    let m4 = fixture.send("alice", "bob", b"m4").unwrap();
    let header = m4.decode_header().unwrap();
    assert_ne!(header.ratchet_public_key, first_key);
    assert_eq!(header.previous_chain_length, 4);
    assert_eq!(fixture.receive("bob", "alice", &m4).unwrap(), b"m4");
    check(&fixture, "after late delivery");
}

#[test]
fn previous_chain_survives_ratchet_turn() {
    let mut fixture = Fixture::new(8, &["alice", "bob"]);
    let first = send_batch(&mut fixture, "alice", "bob", 4);
    fixture.receive("bob", "alice", &first[0]).unwrap();

    let reply = fixture.send("bob", "alice", b"reply").unwrap();
    fixture.receive("alice", "bob", &reply).unwrap();
    let second = fixture.send("alice", "bob", b"new chain").unwrap();

    assert_eq!(fixture.receive("bob", "alice", &second).unwrap(), b"new chain");
    assert_eq!(fixture.client("bob").session("alice").unwrap().skipped_len(), 3);

    for (i, message) in first.iter().enumerate().skip(1) {
        assert_eq!(fixture.receive("bob", "alice", message).unwrap(), vec![i as u8]);
    }
    check(&fixture, "after draining previous chain");
}

#[test]
fn skip_limit_rejects_without_mutation() {
    let options = FixtureOptions {
        config: ClientConfig::default().with_max_skip(5),
        ..FixtureOptions::default()
    };
    let mut fixture = Fixture::with_options(9, &["alice", "bob"], options);
    let messages = send_batch(&mut fixture, "alice", "bob", 8);
    fixture.receive("bob", "alice", &messages[0]).unwrap();

    let result = fixture.receive("bob", "alice", &messages[7]);

    assert!(matches!(result, Err(SessionError::ProtocolViolation { .. })));
    assert!(result.unwrap_err().is_fatal());
    let session = fixture.client("bob").session("alice").unwrap();
    assert_eq!(session.receive_counter(), 1);
    assert_eq!(session.skipped_len(), 0);

    assert_eq!(fixture.receive("bob", "alice", &messages[6]).unwrap(), vec![6]);
    assert_eq!(fixture.receive("bob", "alice", &messages[7]).unwrap(), vec![7]);
}

#[test]
fn skipped_cache_stays_bounded() {
    let options = FixtureOptions {
        config: ClientConfig::default().with_max_skipped_keys(4),
        ..FixtureOptions::default()
    };
    let mut fixture = Fixture::with_options(10, &["alice", "bob"], options);

    for _ in 0..3 {
        let batch = send_batch(&mut fixture, "alice", "bob", 6);
        fixture.receive("bob", "alice", &batch[5]).unwrap();
        check(&fixture, "after lossy batch");
    }

    assert_eq!(fixture.client("bob").session("alice").unwrap().skipped_len(), 4);
}

#[test]
fn escrow_recovers_every_message_key() {
    let mut fixture = Fixture::new(11, &["alice", "bob"]);
    let mut messages = send_batch(&mut fixture, "alice", "bob", 3);
    fixture.receive("bob", "alice", &messages[0]).unwrap();
    messages.push(fixture.send("bob", "alice", b"reply").unwrap());

    // Bob never receives messages 1 and 2; escrow does not depend on it.
    for message in &messages {
        let header = message.decode_header().unwrap();
        let key = fixture.unescrow(message).unwrap();
        let plaintext =
            aead::open(key.as_bytes(), &header.message_iv, &message.ciphertext, &message.header)
                .unwrap();
        assert!(!plaintext.is_empty());
    }
}

#[test]
fn escrow_packages_are_independent() {
    let mut fixture = Fixture::new(12, &["alice", "bob"]);
    let messages = send_batch(&mut fixture, "alice", "bob", 2);

    let first = messages[0].decode_header().unwrap().escrow.unwrap();
    let second = messages[1].decode_header().unwrap().escrow.unwrap();

    assert_ne!(first.ephemeral_public_key, second.ephemeral_public_key);
    assert_ne!(
        fixture.unescrow(&messages[0]).unwrap().as_bytes(),
        fixture.unescrow(&messages[1]).unwrap().as_bytes()
    );
}

#[test]
fn restored_clients_continue_conversation() {
    let mut fixture = Fixture::new(13, &["alice", "bob"]);
    let batch = send_batch(&mut fixture, "alice", "bob", 5);
    fixture.receive("bob", "alice", &batch[4]).unwrap();

    let alice_state = fixture.export("alice").unwrap();
    let bob_state = fixture.export("bob").unwrap();
    fixture.restore("alice", &alice_state).unwrap();
    fixture.restore("bob", &bob_state).unwrap();

    for (i, message) in batch.iter().enumerate().take(4) {
        assert_eq!(fixture.receive("bob", "alice", message).unwrap(), vec![i as u8]);
    }

    let reply = fixture.send("bob", "alice", b"reply").unwrap();
    assert_eq!(fixture.receive("alice", "bob", &reply).unwrap(), b"reply");
    let more = fixture.send("alice", "bob", b"more").unwrap();
    assert_eq!(fixture.receive("bob", "alice", &more).unwrap(), b"more");
    check(&fixture, "after restore");
}

#[test]
fn third_party_cannot_read_or_inject() {
    let mut fixture = Fixture::new(14, &["alice", "bob", "eve"]);
    let message = fixture.send("alice", "bob", b"secret").unwrap();

    assert_eq!(fixture.receive("eve", "alice", &message), Err(SessionError::DecryptionFailure));
    assert!(!fixture.client("eve").has_session("alice"));

    let forged = fixture.send("eve", "bob", b"hi from alice").unwrap();
    assert_eq!(fixture.receive("bob", "alice", &forged), Err(SessionError::DecryptionFailure));
    assert!(!fixture.client("bob").has_session("alice"));

    assert_eq!(fixture.receive("bob", "alice", &message).unwrap(), b"secret");
}

#[test]
fn unknown_sender_rejected() {
    let mut fixture = Fixture::new(15, &["alice", "bob"]);
    fixture.enroll("carol");
    fixture.introduce("carol", "bob");

    let message = fixture.send("carol", "bob", b"hello").unwrap();

    assert_eq!(
        fixture.receive("bob", "carol", &message),
        Err(SessionError::UnknownPeer { peer: "carol".into() })
    );
}

#[test]
fn random_bit_flips_never_authenticate() {
    let mut fixture = Fixture::new(16, &["alice", "bob"]);
    let opener = fixture.send("alice", "bob", b"opener").unwrap();
    fixture.receive("bob", "alice", &opener).unwrap();
    let target = fixture.send("alice", "bob", b"target").unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(16);

    for _ in 0..64 {
        let tampered = flip_bit(&mut rng, &target);
        assert!(fixture.receive("bob", "alice", &tampered).is_err());
    }

    assert_eq!(fixture.receive("bob", "alice", &target).unwrap(), b"target");
}
