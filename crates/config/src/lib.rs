//! Chorus configuration structures to map the chorus.toml configuration.

#![deny(missing_docs)]

mod discovery;
mod gateway;
mod health;
mod loader;
mod models;

use std::collections::BTreeMap;
use std::path::Path;

pub use discovery::DiscoveryConfig;
pub use gateway::GatewayConfig;
pub use health::HealthConfig;
pub use models::SelfHostedConfig;
use serde::Deserialize;
use url::Url;

/// Main configuration structure for the Chorus orchestrator.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Model discovery endpoint and retry schedule.
    pub discovery: DiscoveryConfig,
    /// Health probing cadence for self-hosted models.
    pub health: HealthConfig,
    /// Shared gateway endpoint and credential.
    pub gateway: GatewayConfig,
    /// Static base URLs for self-hosted models, keyed by model identifier.
    pub models: BTreeMap<String, SelfHostedConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one reachable upstream class.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_upstreams(self)
    }

    /// Base URL configured for a self-hosted model, if any.
    pub fn self_hosted_url(&self, model_id: &str) -> Option<&Url> {
        self.models.get(model_id).map(|model| &model.url)
    }
}
