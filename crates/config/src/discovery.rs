//! Model discovery endpoint configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Where the model registry is fetched from, and how stubbornly.
///
/// The discovery document lives at `{base_url}/api/models`; per-model status
/// endpoints at `{base_url}/api/models/{id}/status`. Self-hosted registries
/// on free-tier compute cold-start slowly, so the load path retries with
/// exponential backoff before giving up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Origin of the registry service.
    pub base_url: Url,
    /// Optional static discovery document used when the registry is unreachable.
    pub fallback_url: Option<Url>,
    /// Per-attempt fetch timeout.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Maximum number of fetch attempts before falling back.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(deserialize_with = "deserialize_duration")]
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after every retry.
    pub backoff_factor: f64,
    /// Ceiling for the retry delay.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_backoff: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8000").expect("default URL should be valid"),
            fallback_url: None,
            timeout: Duration::from_secs(8),
            max_attempts: 8,
            initial_backoff: Duration::from_millis(800),
            backoff_factor: 1.4,
            max_backoff: Duration::from_secs(3),
        }
    }
}

impl DiscoveryConfig {
    /// URL of the discovery document.
    pub fn models_url(&self) -> String {
        format!("{}/api/models", self.base_url.as_str().trim_end_matches('/'))
    }

    /// URL of the status endpoint for one model.
    pub fn status_url(&self, model_id: &str) -> String {
        format!(
            "{}/api/models/{model_id}/status",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// Retry delay before the given zero-based attempt, following the
    /// configured exponential schedule with its ceiling applied.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = self.backoff_factor.powi(attempt as i32);
        let delay = self.initial_backoff.as_secs_f64() * exponent;

        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}
