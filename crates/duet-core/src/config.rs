//! Client configuration.

/// Default largest gap a single header may open in one chain.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Default cap on cached skipped keys per session.
pub const DEFAULT_MAX_SKIPPED_KEYS: usize = 2000;

/// Protocol limits for a [`Client`](crate::Client).
///
/// Both limits bound the skipped-key cache. Without them a single forged
/// header with `message_index = u32::MAX` would force billions of HMAC steps
/// and cache every resulting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Largest number of message keys one received header may skip over in
    /// a single chain. A header exceeding it is rejected as a protocol
    /// violation and changes nothing.
    pub max_skip: u32,

    /// Total cached skipped keys per session. When an insert exceeds it the
    /// oldest cached keys are evicted first, and the messages they belonged
    /// to become undecryptable.
    pub max_skipped_keys: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { max_skip: DEFAULT_MAX_SKIP, max_skipped_keys: DEFAULT_MAX_SKIPPED_KEYS }
    }
}

impl ClientConfig {
    /// Set [`ClientConfig::max_skip`].
    #[must_use]
    pub fn with_max_skip(mut self, max_skip: u32) -> Self {
        self.max_skip = max_skip;
        self
    }

    /// Set [`ClientConfig::max_skipped_keys`].
    #[must_use]
    pub fn with_max_skipped_keys(mut self, max_skipped_keys: usize) -> Self {
        self.max_skipped_keys = max_skipped_keys;
        self
    }
}
