//! Generic circuit breaker implementation.

use crate::resilience::{CircuitBreakerBehavior, CircuitBreakerMetrics, CircuitState};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures needed to open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit waits before allowing a half-open probe.
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u64,
    half_open_calls: u64,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    total_duration: Duration,
    opened_at: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            total_duration: Duration::ZERO,
            opened_at: None,
        }
    }
}

/// A generic, named circuit breaker.
///
/// `should_allow` performs the Open → HalfOpen transition lazily (on read),
/// matching the teacher's pattern of checking elapsed time at the call site
/// rather than running a timer loop for every breaker instance.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        self.inner.lock().unwrap().state
    }

    fn maybe_transition_to_half_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 0;
                    info!(breaker = %self.name, "circuit breaker transitioning to half-open");
                }
            }
        }
    }

    pub fn should_allow(&self) -> bool {
        self.maybe_transition_to_half_open();
        !matches!(self.inner.lock().unwrap().state, CircuitState::Open)
    }

    pub fn record_success_manual(&self, duration: Duration) {
        self.maybe_transition_to_half_open();
        let mut inner = self.inner.lock().unwrap();
        inner.total_calls += 1;
        inner.success_count += 1;
        inner.total_duration += duration;
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                if inner.half_open_calls >= self.config.success_threshold as u64 {
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                    info!(breaker = %self.name, "circuit breaker closed after recovery");
                }
            }
            CircuitState::Open => {
                // Racing success after a timeout read elsewhere; treat as recovery.
                inner.state = CircuitState::HalfOpen;
                inner.half_open_calls = 1;
            }
        }
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        self.maybe_transition_to_half_open();
        let mut inner = self.inner.lock().unwrap();
        inner.total_calls += 1;
        inner.failure_count += 1;
        inner.total_duration += duration;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold as u64 {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    info!(breaker = %self.name, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_calls = 0;
                info!(breaker = %self.name, "circuit breaker reopened after half-open failure");
            }
            CircuitState::Open => {}
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    pub fn force_closed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().unwrap();
        let failure_rate = if inner.total_calls > 0 {
            inner.failure_count as f64 / inner.total_calls as f64
        } else {
            0.0
        };
        let success_rate = if inner.total_calls > 0 {
            inner.success_count as f64 / inner.total_calls as f64
        } else {
            0.0
        };
        let average_duration = if inner.total_calls > 0 {
            inner.total_duration / inner.total_calls as u32
        } else {
            Duration::ZERO
        };
        CircuitBreakerMetrics {
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            half_open_calls: inner.half_open_calls,
            total_duration: inner.total_duration,
            current_state: inner.state,
            failure_rate,
            success_rate,
            average_duration,
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        CircuitBreaker::name(self)
    }

    fn state(&self) -> CircuitState {
        CircuitBreaker::state(self)
    }

    fn should_allow(&self) -> bool {
        CircuitBreaker::should_allow(self)
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration)
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration)
    }

    fn is_healthy(&self) -> bool {
        CircuitBreaker::is_healthy(self)
    }

    fn force_open(&self) {
        CircuitBreaker::force_open(self)
    }

    fn force_closed(&self) {
        CircuitBreaker::force_closed(self)
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreaker::metrics(self)
    }
}
