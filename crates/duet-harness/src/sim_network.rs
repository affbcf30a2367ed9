//! Simulated transport with fault injection.
//!
//! Messages posted to the network sit in a single in-flight pool until the
//! test pulls them out. Depending on [`FaultConfig`] the network reorders,
//! duplicates or drops them, or delivers forged copies. All decisions come
//! from a seeded RNG, so a failing run is reproducible from its seed.

use duet_proto::WireMessage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Fault probabilities. Every rate lies in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Deliver a random in-flight message instead of the oldest
    pub reorder: bool,
    /// Probability that a message is lost when posted
    pub drop_rate: f64,
    /// Probability that a delivered message stays in flight for a second
    /// delivery
    pub duplicate_rate: f64,
    /// Probability that a delivery is a forged copy with one bit flipped.
    /// The original stays in flight.
    pub tamper_rate: f64,
}

impl FaultConfig {
    /// In-order delivery without faults.
    pub fn reliable() -> Self {
        Self { reorder: false, drop_rate: 0.0, duplicate_rate: 0.0, tamper_rate: 0.0 }
    }

    /// Reordering only.
    pub fn reordering() -> Self {
        Self { reorder: true, ..Self::reliable() }
    }

    /// Reordering, duplication and forged copies. Nothing is lost.
    pub fn hostile() -> Self {
        Self { reorder: true, drop_rate: 0.0, duplicate_rate: 0.2, tamper_rate: 0.1 }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::reliable()
    }
}

/// A message in flight between two named clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender name
    pub from: String,
    /// Recipient name
    pub to: String,
    /// The message as posted
    pub message: WireMessage,
    /// Sequence number assigned at post time
    pub sequence: u64,
}

/// One delivery pulled from the network.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The envelope, possibly tampered
    pub envelope: Envelope,
    /// Whether a bit of the header or ciphertext was flipped
    pub tampered: bool,
    /// Whether the original envelope remains in flight
    pub duplicated: bool,
}

/// In-flight message pool.
pub struct SimNetwork {
    rng: ChaCha20Rng,
    faults: FaultConfig,
    in_flight: Vec<Envelope>,
    next_sequence: u64,
    dropped: usize,
}

impl SimNetwork {
    /// Create a network with `faults`, seeded from `seed`.
    ///
    /// # Panics
    ///
    /// Panics if a rate is outside `[0.0, 1.0]`, or if `duplicate_rate` or
    /// `tamper_rate` is 1.0 (the pool would never drain).
    pub fn new(seed: u64, faults: FaultConfig) -> Self {
        for rate in [faults.drop_rate, faults.duplicate_rate, faults.tamper_rate] {
            assert!((0.0..=1.0).contains(&rate), "fault rate must be between 0.0 and 1.0, got {rate}");
        }
        assert!(faults.duplicate_rate < 1.0, "duplicate_rate must be below 1.0");
        assert!(faults.tamper_rate < 1.0, "tamper_rate must be below 1.0");

        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            faults,
            in_flight: Vec::new(),
            next_sequence: 0,
            dropped: 0,
        }
    }

    /// Post a message. Returns `false` if the network dropped it.
    pub fn post(&mut self, from: &str, to: &str, message: WireMessage) -> bool {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.rng.gen_bool(self.faults.drop_rate) {
            tracing::trace!("Dropped message {} from {} to {}", sequence, from, to);
            self.dropped += 1;
            return false;
        }

        self.in_flight.push(Envelope { from: from.to_owned(), to: to.to_owned(), message, sequence });
        true
    }

    /// Pull the next delivery, or `None` if nothing is in flight.
    pub fn deliver(&mut self) -> Option<Delivery> {
        if self.in_flight.is_empty() {
            return None;
        }

        let index =
            if self.faults.reorder { self.rng.gen_range(0..self.in_flight.len()) } else { 0 };

        let tampered = self.rng.gen_bool(self.faults.tamper_rate);
        let duplicated = tampered || self.rng.gen_bool(self.faults.duplicate_rate);
        let mut envelope = if duplicated {
            self.in_flight[index].clone()
        } else {
            self.in_flight.remove(index)
        };

        if tampered {
            envelope.message = flip_bit(&mut self.rng, &envelope.message);
        }

        Some(Delivery { envelope, tampered, duplicated })
    }

    /// Pull every delivery addressed to `to`, in network order.
    pub fn deliver_all_to(&mut self, to: &str) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let mut kept = Vec::new();

        while let Some(delivery) = self.deliver() {
            if delivery.envelope.to == to {
                deliveries.push(delivery);
            } else if !delivery.duplicated {
                kept.push(delivery.envelope);
            }
        }

        self.in_flight = kept;
        deliveries
    }

    /// Messages currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Messages dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Flip one random bit in the header or ciphertext of `message`.
pub fn flip_bit<R: Rng>(rng: &mut R, message: &WireMessage) -> WireMessage {
    let mut header = message.header.to_vec();
    let mut ciphertext = message.ciphertext.to_vec();
    let total = header.len() + ciphertext.len();
    let position = rng.gen_range(0..total);
    let mask = 1u8 << rng.gen_range(0..8);

    if position < header.len() {
        header[position] ^= mask;
    } else {
        ciphertext[position - header.len()] ^= mask;
    }

    WireMessage::new(header, ciphertext)
}
