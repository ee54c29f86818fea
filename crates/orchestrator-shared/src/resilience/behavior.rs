//! Unified interface for circuit-breaker-shaped components.

use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use std::time::Duration;

/// Object-safe behavior shared by every circuit breaker in the system, so
/// health reporting can hold `&dyn CircuitBreakerBehavior` uniformly while
/// hot paths keep using the concrete type.
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self, duration: Duration);
    fn record_failure(&self, duration: Duration);
    fn is_healthy(&self) -> bool;
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}
