//! Queue configuration

use std::time::Duration;

/// Tunable behavior for queue processing
///
/// The defaults mirror the reference behavior: an item is discarded after
/// its 5th failed attempt, and one second elapses between consecutive items
/// during a drain pass so bulk replay does not overwhelm the network layer.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of failed attempts before an item is discarded
    pub max_attempts: u32,
    /// Fixed delay between consecutive items in a drain pass
    pub item_delay: Duration,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            item_delay: Duration::from_secs(1),
            event_capacity: 256,
        }
    }
}

impl QueueConfig {
    /// Set the attempt ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the inter-item delay
    pub fn with_item_delay(mut self, item_delay: Duration) -> Self {
        self.item_delay = item_delay;
        self
    }
}
