//! Per-channel suppression after `channel_not_found`
//!
//! A channel that the upstream reports as missing is blocked for a fixed
//! window instead of being retried. The list heals itself: once the
//! window has passed, the entry is dropped the next time the channel is
//! considered and the following message probes whether the channel
//! exists again.
//!
//! Owned and mutated by the dispatcher only, so no synchronization.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// How long a missing channel stays blocked
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Time-gated block list keyed by channel
#[derive(Debug, Default)]
pub struct SuppressionList {
    entries: HashMap<String, Instant>,
    window: Duration,
}

impl SuppressionList {
    pub fn new() -> Self {
        Self::with_window(SUPPRESSION_WINDOW)
    }

    /// A list with a custom window, for tests
    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
        }
    }

    /// Whether a message to `channel` should be skipped at `now`.
    ///
    /// A stale entry is removed and the call returns false, so the
    /// caller's next send probes the channel again.
    pub fn should_skip(&mut self, channel: &str, now: Instant) -> bool {
        match self.entries.get(channel) {
            None => false,
            Some(since) if now.duration_since(*since) < self.window => true,
            Some(_) => {
                self.entries.remove(channel);
                false
            }
        }
    }

    /// Block `channel` starting at `now`, overwriting any earlier mark.
    pub fn mark(&mut self, channel: &str, now: Instant) {
        self.entries.insert(channel.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
