//! Health probing configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Cadence of the background availability probes for self-hosted models.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the background prober runs at all.
    pub enabled: bool,
    /// Delay between registry load and the first probe cycle.
    #[serde(deserialize_with = "deserialize_duration")]
    pub grace: Duration,
    /// Time between probe cycles.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Per-probe timeout. Anything slower counts as offline.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace: Duration::from_secs(2),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(3),
        }
    }
}
