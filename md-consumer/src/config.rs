use std::time::Duration;

use crate::queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Depth of each per-type queue and of the envelope queue.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Pause after a recoverable broker read error.
    pub retry_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            retry_backoff: Duration::from_millis(100),
        }
    }
}
