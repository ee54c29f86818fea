use serde::{Deserialize, Serialize};

/// Task queue (C4) size limits and scan behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued tasks across all workflows; `enqueue`
    /// beyond this is rejected with a `QueueFull` engine error.
    pub max_size: usize,
    /// Bounded scan depth for `tryDequeueReady` when the heap top is not
    /// eligible (§4.4 default 64).
    pub dequeue_scan_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            dequeue_scan_limit: 64,
        }
    }
}
