//! # Provider Record
//!
//! Tracked by the Provider Registry (C2); opaque to the rest of the system
//! except through the dispatch interface (§3 Provider record, §3
//! Ownership).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthStatus {
    /// Eligible for selection: healthy or degraded (§4.2 Selection).
    pub fn is_eligible(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// A `(protocol, method)` pair a provider advertises support for.
pub type Capability = (String, String);

/// A connected provider's tracked state. The connection handle itself is
/// intentionally not modeled here — dispatch is performed through the
/// `Provider` trait object in the engine crate; this record only carries
/// the registry's bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_id: Uuid,
    pub capabilities: HashSet<Capability>,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Rolling count of total calls and successes, used to compute a
    /// success rate for tie-breaking (§4.2 Selection).
    pub total_calls: u64,
    pub total_successes: u64,
    /// Exponential moving average of response time, in milliseconds.
    pub response_time_ema_ms: f64,
    pub in_flight: u32,
    pub max_in_flight: u32,
    pub supports_concurrent: bool,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_probe_success: bool,
    /// Current adaptive health-probe interval, in seconds (§4.2 Health).
    pub probe_interval_secs: u64,
    pub registered_at: DateTime<Utc>,
}

impl ProviderRecord {
    pub fn new(capabilities: HashSet<Capability>, max_in_flight: u32, supports_concurrent: bool) -> Self {
        Self {
            provider_id: Uuid::new_v4(),
            capabilities,
            health: HealthStatus::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            total_successes: 0,
            response_time_ema_ms: 0.0,
            in_flight: 0,
            max_in_flight,
            supports_concurrent,
            last_probe_at: None,
            last_probe_success: true,
            probe_interval_secs: 30,
            registered_at: Utc::now(),
        }
    }

    pub fn supports(&self, protocol: &str, method: &str) -> bool {
        self.capabilities
            .contains(&(protocol.to_string(), method.to_string()))
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_calls as f64
        }
    }

    pub fn is_saturated(&self) -> bool {
        self.in_flight >= self.max_in_flight
    }

    pub fn is_eligible_for(&self, protocol: &str, method: &str) -> bool {
        self.health.is_eligible() && self.supports(protocol, method) && !self.is_saturated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_provider_is_healthy_with_full_success_rate() {
        let caps = HashSet::from([("llm/v1".to_string(), "generate".to_string())]);
        let p = ProviderRecord::new(caps, 1, false);
        assert_eq!(p.health, HealthStatus::Healthy);
        assert_eq!(p.success_rate(), 1.0);
        assert!(!p.is_saturated());
    }

    #[test]
    fn saturated_provider_is_not_eligible() {
        let caps = HashSet::from([("llm/v1".to_string(), "generate".to_string())]);
        let mut p = ProviderRecord::new(caps, 1, false);
        p.in_flight = 1;
        assert!(!p.is_eligible_for("llm/v1", "generate"));
    }

    #[test]
    fn unknown_capability_is_not_eligible() {
        let caps = HashSet::from([("llm/v1".to_string(), "generate".to_string())]);
        let p = ProviderRecord::new(caps, 4, false);
        assert!(!p.is_eligible_for("python/v1", "execute"));
    }
}
