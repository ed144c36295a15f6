//! Per-request endpoint resolution.

use secrecy::SecretString;

use crate::error::{FanoutError, FanoutResult};
use crate::registry::{ModelRegistry, TransportClass};

const SELF_HOSTED_SUFFIX: &str = "/v1/chat/completions";

/// Where and how to reach one model for one request. Derived, never cached.
#[derive(Debug)]
pub struct Endpoint {
    /// Full chat-completions URL.
    pub url: String,
    pub class: TransportClass,
    /// Bearer credential, attached as `Authorization` when present.
    pub bearer: Option<SecretString>,
    /// Value for the `X-GitHub-Api-Version` header on gateway requests.
    pub api_version: Option<String>,
}

/// Resolve a model identifier against the current registry snapshot and the
/// static endpoint configuration.
///
/// Gateway models without a credential are rejected unless the request is a
/// singleton: single-chat surfaces let the user supply a token
/// interactively, so those requests go out unauthenticated and surface the
/// upstream's own 401 instead.
pub fn resolve_endpoint(
    registry: &ModelRegistry,
    config: &config::Config,
    model_id: &str,
    request_token: Option<&SecretString>,
    singleton: bool,
) -> FanoutResult<Endpoint> {
    let record = registry
        .get(model_id)
        .ok_or_else(|| FanoutError::ModelNotFound(model_id.to_string()))?;

    match record.class {
        TransportClass::SelfHosted => {
            let base = config
                .self_hosted_url(model_id)
                .ok_or_else(|| FanoutError::EndpointNotConfigured(model_id.to_string()))?;

            Ok(Endpoint {
                url: format!("{}{SELF_HOSTED_SUFFIX}", base.as_str().trim_end_matches('/')),
                class: TransportClass::SelfHosted,
                bearer: None,
                api_version: None,
            })
        }
        TransportClass::Gateway => {
            let url = config
                .gateway
                .url
                .as_ref()
                .ok_or_else(|| FanoutError::EndpointNotConfigured(model_id.to_string()))?;

            let bearer = request_token.or(config.gateway.token.as_ref()).cloned();

            if bearer.is_none() && !singleton {
                return Err(FanoutError::AuthRequired(format!(
                    "model '{model_id}' needs a gateway token"
                )));
            }

            Ok(Endpoint {
                // The configured gateway URL is already the full path.
                url: url.as_str().to_string(),
                class: TransportClass::Gateway,
                bearer,
                api_version: Some(config.gateway.api_version.clone()),
            })
        }
    }
}
