//! # Orchestrator Configuration
//!
//! Typed startup configuration: persistence backend selection, queue size
//! limits, default retry configuration, health-probe interval bounds, and
//! per-provider in-flight caps (§6 Configuration inputs). No hot reload is
//! required; configuration is loaded once at startup via the `config`
//! crate layered over a base TOML file and environment-variable overrides,
//! mirroring the teacher's `ConfigManager` pattern.

mod health_probe;
mod provider_registry;
mod queue;
mod retry;

pub use health_probe::HealthProbeConfig;
pub use provider_registry::ProviderRegistryConfig;
pub use queue::QueueConfig;
pub use retry::RetryDefaults;

use crate::models::task::BackoffStrategy;
use serde::{Deserialize, Serialize};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Which persistence backend to use at startup.
    pub persistence: PersistenceSelection,
    pub queue: QueueConfig,
    pub retry_defaults: RetryDefaults,
    pub health_probe: HealthProbeConfig,
    pub provider_registry: ProviderRegistryConfig,
    /// Maximum time a task may remain unassignable before being failed
    /// (the "dead-letter timeout" of §7).
    pub dead_letter_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceSelection::default(),
            queue: QueueConfig::default(),
            retry_defaults: RetryDefaults::default(),
            health_probe: HealthProbeConfig::default(),
            provider_registry: ProviderRegistryConfig::default(),
            dead_letter_timeout_secs: 600,
        }
    }
}

/// Which `PersistenceBackend` implementation the coordinator should
/// construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceSelection {
    #[default]
    SingleNode,
    Distributed,
}

/// Loads an [`OrchestratorConfig`] by layering a base TOML file with
/// environment-variable overrides prefixed `ORCHESTRATOR_` (e.g.
/// `ORCHESTRATOR_QUEUE__MAX_SIZE=10000`), matching the teacher's
/// `config`-crate layering convention.
#[derive(Debug)]
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from `path` (if it exists) layered with
    /// environment overrides; falls back to [`OrchestratorConfig::default`]
    /// when no file is present.
    pub fn load(path: Option<&str>) -> Result<OrchestratorConfig, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        );
        // `serde(default)` on every config struct means an empty/partial
        // source layer still deserializes into spec-default values.
        builder.build()?.try_deserialize()
    }
}

/// Resolve the effective backoff delay for a retry attempt, per §4.8/§7.
/// `attempt` is 1-based (the first retry is attempt 1).
pub fn compute_backoff_delay(
    strategy: BackoffStrategy,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: bool,
    attempt: u32,
) -> std::time::Duration {
    let raw_ms = match strategy {
        BackoffStrategy::Fixed => base_delay_ms,
        BackoffStrategy::Linear => base_delay_ms.saturating_mul(attempt as u64),
        BackoffStrategy::Exponential => {
            let exponent = attempt.saturating_sub(1).min(32);
            base_delay_ms.saturating_mul(1u64 << exponent)
        }
    };
    let capped_ms = raw_ms.min(max_delay_ms);
    let final_ms = if jitter {
        let multiplier = 0.5 + fastrand::f64(); // uniform in [0.5, 1.5]
        (capped_ms as f64 * multiplier) as u64
    } else {
        capped_ms
    };
    std::time::Duration::from_millis(final_ms)
}
