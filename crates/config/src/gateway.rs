//! Gateway endpoint configuration.

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Hosted inference gateway shared by every gateway-class model.
///
/// The URL is the full chat-completions endpoint; nothing is appended to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Chat-completions endpoint of the gateway.
    pub url: Option<Url>,
    /// Bearer credential sent as `Authorization` on gateway requests.
    pub token: Option<SecretString>,
    /// Value of the `X-GitHub-Api-Version` header.
    pub api_version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            api_version: "2022-11-28".to_string(),
        }
    }
}
