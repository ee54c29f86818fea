use crate::models::task::BackoffStrategy;
use serde::{Deserialize, Serialize};

/// Default retry configuration applied to a task that does not declare its
/// own retry block in a workflow description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}
