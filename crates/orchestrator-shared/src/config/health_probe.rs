use serde::{Deserialize, Serialize};

/// Adaptive health-probe interval bounds and failure thresholds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthProbeConfig {
    pub initial_interval_secs: u64,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Consecutive failures to demote healthy → degraded.
    pub degrade_after_failures: u32,
    /// Consecutive failures to demote (healthy or degraded) → unavailable.
    pub unavailable_after_failures: u32,
    /// Consecutive successful probes an unavailable provider must pass
    /// before being reconsidered eligible.
    pub recovery_probes_required: u32,
    /// Consecutive successes at a halved interval before it doubles back
    /// toward the ceiling.
    pub interval_recovery_successes: u32,
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: 30,
            min_interval_secs: 5,
            max_interval_secs: 60,
            degrade_after_failures: 3,
            unavailable_after_failures: 5,
            recovery_probes_required: 2,
            interval_recovery_successes: 3,
        }
    }
}
