//! Per-model endpoint configuration for self-hosted models.

use serde::Deserialize;
use url::Url;

/// Static endpoint for one self-hosted model.
///
/// In development these point at `localhost:<port>` pairs; in production at
/// per-subdomain HTTPS URLs. The OpenAI-compatible path suffix is appended
/// at request time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfHostedConfig {
    /// Base URL of the model server.
    pub url: Url,
}
