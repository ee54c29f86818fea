use serde::{Deserialize, Serialize};

/// Per-provider dispatch concurrency caps (§4.8 Assignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderRegistryConfig {
    /// Default max in-flight requests for a non-streaming provider.
    pub default_max_in_flight: u32,
    /// Max in-flight requests for providers that declare concurrent
    /// execution support at registration time.
    pub concurrent_provider_max_in_flight: u32,
}

impl Default for ProviderRegistryConfig {
    fn default() -> Self {
        Self {
            default_max_in_flight: 1,
            concurrent_provider_max_in_flight: 8,
        }
    }
}
