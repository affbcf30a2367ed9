//! Cache of message keys derived ahead of an out-of-order message.

use std::collections::{HashMap, VecDeque};

use duet_crypto::{KeyFingerprint, MessageKey};

/// Identifies a skipped key: the sender's ratchet key and the message index.
pub type SkippedKeyId = (KeyFingerprint, u32);

/// Bounded cache of skipped message keys with oldest-first eviction.
///
/// # Invariants
///
/// - `order` holds exactly the ids in `keys`, oldest insert first
/// - Each key is returned by [`SkippedKeys::take`] at most once
#[derive(Clone, Default)]
pub struct SkippedKeys {
    keys: HashMap<SkippedKeyId, MessageKey>,
    order: VecDeque<SkippedKeyId>,
}

impl SkippedKeys {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check if a key is cached.
    pub fn contains(&self, ratchet: &KeyFingerprint, index: u32) -> bool {
        self.keys.contains_key(&(*ratchet, index))
    }

    /// Look up a cached key without consuming it.
    pub fn get(&self, ratchet: &KeyFingerprint, index: u32) -> Option<&MessageKey> {
        self.keys.get(&(*ratchet, index))
    }

    /// Remove and return a cached key.
    pub fn take(&mut self, ratchet: &KeyFingerprint, index: u32) -> Option<MessageKey> {
        let id = (*ratchet, index);
        let key = self.keys.remove(&id)?;
        self.order.retain(|entry| *entry != id);
        Some(key)
    }

    /// Cache a key, then evict oldest entries until at most `capacity` remain.
    ///
    /// Returns the number of evicted keys.
    pub fn insert(
        &mut self,
        ratchet: KeyFingerprint,
        index: u32,
        key: MessageKey,
        capacity: usize,
    ) -> usize {
        let id = (ratchet, index);
        if self.keys.insert(id, key).is_none() {
            self.order.push_back(id);
        }

        let mut evicted = 0;
        while self.keys.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    /// Iterate over cached keys, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyFingerprint, u32, &MessageKey)> {
        self.order.iter().filter_map(|id| self.keys.get(id).map(|key| (&id.0, id.1, key)))
    }
}

impl std::fmt::Debug for SkippedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkippedKeys").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use duet_crypto::KEY_SIZE;

    use super::*;

    const RATCHET_A: KeyFingerprint = [0xAA; 32];
    const RATCHET_B: KeyFingerprint = [0xBB; 32];

    fn key(byte: u8) -> MessageKey {
        MessageKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn take_consumes_key() {
        let mut cache = SkippedKeys::new();
        cache.insert(RATCHET_A, 3, key(3), 10);

        assert!(cache.contains(&RATCHET_A, 3));
        assert_eq!(cache.take(&RATCHET_A, 3).unwrap().as_bytes(), &[3; KEY_SIZE]);
        assert!(cache.take(&RATCHET_A, 3).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_scoped_by_ratchet() {
        let mut cache = SkippedKeys::new();
        cache.insert(RATCHET_A, 0, key(1), 10);

        assert!(cache.get(&RATCHET_B, 0).is_none());
        assert!(cache.get(&RATCHET_A, 0).is_some());
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let mut cache = SkippedKeys::new();
        for index in 0..5 {
            let evicted = cache.insert(RATCHET_A, index, key(index as u8), 3);
            assert_eq!(evicted, usize::from(index >= 3));
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&RATCHET_A, 0));
        assert!(!cache.contains(&RATCHET_A, 1));
        assert!(cache.contains(&RATCHET_A, 2));
        assert!(cache.contains(&RATCHET_A, 4));
    }

    #[test]
    fn take_keeps_order_consistent() {
        let mut cache = SkippedKeys::new();
        cache.insert(RATCHET_A, 0, key(0), 2);
        cache.insert(RATCHET_A, 1, key(1), 2);
        cache.take(&RATCHET_A, 0);
        cache.insert(RATCHET_A, 2, key(2), 2);

        // Index 1 is now the oldest and must survive: the cache is at capacity.
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&RATCHET_A, 1));

        let order: Vec<_> = cache.iter().map(|(_, index, _)| index).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn debug_does_not_print_keys() {
        let mut cache = SkippedKeys::new();
        cache.insert(RATCHET_A, 0, key(0x42), 10);

        assert_eq!(format!("{cache:?}"), "SkippedKeys { len: 1 }");
    }
}
