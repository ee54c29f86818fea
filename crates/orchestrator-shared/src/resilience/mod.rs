//! # Resilience Primitives
//!
//! A small generic circuit breaker, exported so a caller embedding this
//! engine can wrap its own provider transports or persistence backends in
//! one without reinventing the state machine. Not used internally by the
//! provider registry (C2), which tracks the specific asymmetric health
//! thresholds of §4.2 directly on `ProviderRecord` — this is a general
//! building block for the surrounding system, mirroring the three-state
//! model (Closed/Open/HalfOpen) used throughout the teacher codebase.

mod behavior;
mod breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use metrics::CircuitBreakerMetrics;

/// The three states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}
