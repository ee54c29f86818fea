//! # Provider Registry (C2)
//!
//! Tracks connected providers, selects a provider for a `(protocol,
//! method)` pair, and evolves health state from dispatch outcomes and
//! scheduled probes (§4.2).

use crate::errors::{EngineError, EngineResult};
use async_trait::async_trait;
use dashmap::DashMap;
use orchestrator_shared::config::HealthProbeConfig;
use orchestrator_shared::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use orchestrator_shared::models::provider::{Capability, HealthStatus, ProviderRecord};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A connected provider's transport, duck-typed so any dispatch mechanism
/// (in-process, HTTP, a message queue) can implement it (§6, §9 Open
/// Question "Provider interface concreteness").
#[async_trait]
pub trait Provider: Send + Sync {
    fn capabilities(&self) -> &HashSet<Capability>;

    /// Performs the RPC call. A transport-level failure (connection
    /// refused, malformed response) is an `Err`; a well-formed JSON-RPC
    /// error response is `Ok(JsonRpcResponse::Error { .. })` and does not
    /// count against provider health (§4.2 Failure semantics).
    async fn dispatch(&self, request: JsonRpcRequest) -> EngineResult<JsonRpcResponse>;

    /// A lightweight liveness probe, independent of `dispatch`.
    async fn health_probe(&self) -> bool;
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider(capabilities={:?})", self.capabilities())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DispatchOutcome {
    TransportSuccess,
    TransportFailure,
}

struct ProviderEntry {
    record: Mutex<ProviderRecord>,
    handle: Arc<dyn Provider>,
}

/// Registered providers plus a per-`(protocol, method)` round-robin
/// cursor used to break ties among equally-ranked candidates (§4.2
/// Selection).
pub struct ProviderRegistry {
    providers: DashMap<Uuid, ProviderEntry>,
    cursors: DashMap<Capability, AtomicUsize>,
    health_config: HealthProbeConfig,
}

impl ProviderRegistry {
    pub fn new(health_config: HealthProbeConfig) -> Self {
        Self {
            providers: DashMap::new(),
            cursors: DashMap::new(),
            health_config,
        }
    }

    /// Registers a new provider connection, returning its assigned id
    /// (§3 Provider record: "provider id (assigned on connect)").
    #[instrument(skip(self, handle))]
    pub fn register(
        &self,
        handle: Arc<dyn Provider>,
        max_in_flight: u32,
        supports_concurrent: bool,
    ) -> Uuid {
        let record = ProviderRecord::new(handle.capabilities().clone(), max_in_flight, supports_concurrent);
        let provider_id = record.provider_id;
        info!(provider_id = %provider_id, max_in_flight, supports_concurrent, "provider registered");
        self.providers.insert(
            provider_id,
            ProviderEntry {
                record: Mutex::new(record),
                handle,
            },
        );
        provider_id
    }

    pub fn deregister(&self, provider_id: Uuid) -> bool {
        self.providers.remove(&provider_id).is_some()
    }

    pub fn get(&self, provider_id: Uuid) -> Option<ProviderRecord> {
        self.providers
            .get(&provider_id)
            .map(|e| e.record.lock().unwrap().clone())
    }

    pub fn list(&self) -> Vec<ProviderRecord> {
        self.providers
            .iter()
            .map(|e| e.record.lock().unwrap().clone())
            .collect()
    }

    /// Providers with spare capacity, ordered fewest-in-flight-first, for
    /// the coordinator's proactive assignment sweep (§4.8 Assignment).
    pub fn ordered_by_capacity(&self) -> Vec<Uuid> {
        let mut records: Vec<ProviderRecord> = self
            .providers
            .iter()
            .map(|e| e.record.lock().unwrap().clone())
            .filter(|r| r.health.is_eligible() && !r.is_saturated())
            .collect();
        records.sort_by_key(|r| r.in_flight);
        records.into_iter().map(|r| r.provider_id).collect()
    }

    pub fn capabilities_of(&self, provider_id: Uuid) -> HashSet<Capability> {
        self.providers
            .get(&provider_id)
            .map(|e| e.handle.capabilities().clone())
            .unwrap_or_default()
    }

    /// Selects a provider for `(protocol, method)` among all eligible,
    /// non-saturated candidates, preferring healthy over degraded, then
    /// breaking ties by fewest in-flight, highest success rate, lowest
    /// response-time estimate, then round-robin (§4.2 Selection).
    pub fn select(&self, protocol: &str, method: &str) -> EngineResult<Uuid> {
        let mut candidates: Vec<ProviderRecord> = self
            .providers
            .iter()
            .map(|e| e.record.lock().unwrap().clone())
            .filter(|r| r.is_eligible_for(protocol, method))
            .collect();

        if candidates.is_empty() {
            return Err(EngineError::NoProviderAvailable {
                protocol: protocol.to_string(),
                method: method.to_string(),
            });
        }

        let has_healthy = candidates.iter().any(|r| r.health == HealthStatus::Healthy);
        if has_healthy {
            candidates.retain(|r| r.health == HealthStatus::Healthy);
        }

        candidates.sort_by(|a, b| {
            a.in_flight
                .cmp(&b.in_flight)
                .then(b.success_rate().partial_cmp(&a.success_rate()).unwrap_or(std::cmp::Ordering::Equal))
                .then(
                    a.response_time_ema_ms
                        .partial_cmp(&b.response_time_ema_ms)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let best_in_flight = candidates[0].in_flight;
        let best_success_rate = candidates[0].success_rate();
        let best_response_time = candidates[0].response_time_ema_ms;
        let tied: Vec<Uuid> = candidates
            .iter()
            .take_while(|r| {
                r.in_flight == best_in_flight
                    && (r.success_rate() - best_success_rate).abs() < f64::EPSILON
                    && (r.response_time_ema_ms - best_response_time).abs() < f64::EPSILON
            })
            .map(|r| r.provider_id)
            .collect();

        if tied.len() == 1 {
            return Ok(tied[0]);
        }

        let key: Capability = (protocol.to_string(), method.to_string());
        let cursor = self
            .cursors
            .entry(key)
            .or_insert_with(|| AtomicUsize::new(0));
        let idx = cursor.fetch_add(1, Ordering::Relaxed) % tied.len();
        Ok(tied[idx])
    }

    /// Reserves a dispatch slot on `provider_id`, incrementing in-flight
    /// synchronously so a concurrent assignment sweep observes the
    /// updated capacity immediately (§4.8 Assignment concurrency note).
    pub fn reserve(&self, provider_id: Uuid) -> EngineResult<Arc<dyn Provider>> {
        let entry = self
            .providers
            .get(&provider_id)
            .ok_or(EngineError::ProviderNotFound { provider_id })?;
        let mut record = entry.record.lock().unwrap();
        if !record.health.is_eligible() || record.is_saturated() {
            return Err(EngineError::ProviderUnavailable { provider_id });
        }
        record.in_flight += 1;
        Ok(entry.handle.clone())
    }

    /// Releases a reserved slot without ever having dispatched through it —
    /// the reservation was abandoned for a reason that has nothing to do
    /// with the provider (a parameter substitution failure, the task
    /// vanishing mid-assignment) — so it must not count against health.
    pub fn release_unused(&self, provider_id: Uuid) {
        let Some(entry) = self.providers.get(&provider_id) else {
            return;
        };
        let mut record = entry.record.lock().unwrap();
        record.in_flight = record.in_flight.saturating_sub(1);
    }

    /// Releases a previously-reserved slot and records the transport-level
    /// outcome against provider health (§4.2 Failure semantics).
    pub fn release(&self, provider_id: Uuid, outcome: DispatchOutcome, elapsed: Duration) {
        let Some(entry) = self.providers.get(&provider_id) else {
            return;
        };
        let mut record = entry.record.lock().unwrap();
        record.in_flight = record.in_flight.saturating_sub(1);
        match outcome {
            DispatchOutcome::TransportSuccess => {
                self.apply_success(&mut record, elapsed.as_secs_f64() * 1000.0)
            }
            DispatchOutcome::TransportFailure => self.apply_failure(&mut record),
        }
    }

    fn apply_success(&self, record: &mut ProviderRecord, elapsed_ms: f64) {
        record.total_calls += 1;
        record.total_successes += 1;
        record.consecutive_failures = 0;
        record.consecutive_successes += 1;
        record.response_time_ema_ms = if record.response_time_ema_ms == 0.0 {
            elapsed_ms
        } else {
            0.2 * elapsed_ms + 0.8 * record.response_time_ema_ms
        };
        // A single dispatch success restores a degraded provider to
        // healthy; an unavailable provider is only restored by the
        // dedicated probe path in `record_probe_result`.
        if record.health == HealthStatus::Degraded {
            record.health = HealthStatus::Healthy;
            info!(provider_id = %record.provider_id, "provider restored to healthy after dispatch success");
        }
    }

    fn apply_failure(&self, record: &mut ProviderRecord) {
        record.total_calls += 1;
        record.consecutive_failures += 1;
        record.consecutive_successes = 0;
        let previous_health = record.health;
        if record.consecutive_failures >= self.health_config.unavailable_after_failures {
            record.health = HealthStatus::Unavailable;
        } else if record.consecutive_failures >= self.health_config.degrade_after_failures
            && record.health == HealthStatus::Healthy
        {
            record.health = HealthStatus::Degraded;
        }
        if record.health != previous_health {
            warn!(
                provider_id = %record.provider_id,
                consecutive_failures = record.consecutive_failures,
                from = ?previous_health,
                to = ?record.health,
                "provider health demoted"
            );
        }
    }

    /// Applies the outcome of a scheduled health probe, including the
    /// adaptive interval adjustment (§4.2 Health): the interval halves
    /// (floored) on failure and doubles (capped) after
    /// `interval_recovery_successes` consecutive successes.
    #[instrument(skip(self))]
    pub fn record_probe_result(&self, provider_id: Uuid, success: bool) -> Option<u64> {
        let entry = self.providers.get(&provider_id)?;
        let mut record = entry.record.lock().unwrap();
        record.last_probe_at = Some(chrono::Utc::now());
        record.last_probe_success = success;
        let cfg = &self.health_config;
        let previous_health = record.health;
        if success {
            record.consecutive_failures = 0;
            record.consecutive_successes += 1;
            match record.health {
                HealthStatus::Degraded => record.health = HealthStatus::Healthy,
                HealthStatus::Unavailable => {
                    if record.consecutive_successes >= cfg.recovery_probes_required {
                        record.health = HealthStatus::Healthy;
                    }
                }
                HealthStatus::Healthy => {}
            }
            if record.consecutive_successes > 0
                && record.consecutive_successes % cfg.interval_recovery_successes == 0
            {
                record.probe_interval_secs =
                    (record.probe_interval_secs * 2).min(cfg.max_interval_secs);
            }
        } else {
            record.consecutive_successes = 0;
            record.consecutive_failures += 1;
            if record.consecutive_failures >= cfg.unavailable_after_failures {
                record.health = HealthStatus::Unavailable;
            } else if record.consecutive_failures >= cfg.degrade_after_failures {
                record.health = HealthStatus::Degraded;
            }
            record.probe_interval_secs = (record.probe_interval_secs / 2).max(cfg.min_interval_secs);
        }
        if record.health != previous_health {
            info!(
                provider_id = %provider_id,
                from = ?previous_health,
                to = ?record.health,
                "provider health changed by health probe"
            );
        }
        Some(record.probe_interval_secs)
    }

    pub fn handle_of(&self, provider_id: Uuid) -> Option<Arc<dyn Provider>> {
        self.providers.get(&provider_id).map(|e| e.handle.clone())
    }
}
