//! Circuit breaker metrics snapshot, exported for a caller to wire into
//! whatever observability backend they use (no exporter is bundled here;
//! metrics/dashboard wiring is out of scope).

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "healthy - normal operation",
            CircuitState::Open => "failing - rejecting calls",
            CircuitState::HalfOpen => "recovering - testing health",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_description_matches_state() {
        let m = CircuitBreakerMetrics {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Open,
            failure_rate: 1.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        };
        assert_eq!(m.state_description(), "failing - rejecting calls");
    }
}
