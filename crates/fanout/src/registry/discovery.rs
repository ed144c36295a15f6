//! Discovery document fetching and normalization.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{FanoutError, FanoutResult};
use crate::registry::{Availability, ModelRecord, TransportClass};

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    models: Vec<DiscoveredModel>,
}

/// One entry of the discovery document. Everything but the identifier is
/// optional; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct DiscoveredModel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    class: Option<String>,
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default, rename = "default")]
    is_default: bool,
}

impl DiscoveredModel {
    fn into_record(self) -> Option<ModelRecord> {
        let Some(id) = self.id.filter(|id| !id.is_empty()) else {
            log::warn!("dropping discovery entry without an id");
            return None;
        };

        let class = normalize_class(self.class.as_deref());

        Some(ModelRecord {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            class,
            priority: self.priority,
            context_length: self.context_length,
            default: self.is_default,
            availability: match class {
                // The gateway itself is assumed reachable and never probed.
                TransportClass::Gateway => Availability::Online,
                TransportClass::SelfHosted => Availability::Unknown,
            },
        })
    }
}

/// Legacy spellings `github` and `api` both mean the hosted gateway; any
/// other value (or none) means self-hosted.
fn normalize_class(raw: Option<&str>) -> TransportClass {
    match raw {
        Some("github") | Some("api") => TransportClass::Gateway,
        _ => TransportClass::SelfHosted,
    }
}

/// Fetch the discovery document, retrying through the configured backoff
/// schedule and finally trying the static fallback document once.
pub(super) async fn fetch_with_retry(
    client: &reqwest::Client,
    config: &config::DiscoveryConfig,
) -> FanoutResult<Vec<ModelRecord>> {
    let url = config.models_url();
    let mut last_error = String::from("no fetch attempted");

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.backoff_delay(attempt - 1)).await;
        }

        match fetch_document(client, &url, config.timeout).await {
            Ok(records) => return Ok(records),
            Err(error) => {
                log::warn!(
                    "model discovery attempt {attempt}/{max} failed: {error}",
                    attempt = attempt + 1,
                    max = config.max_attempts
                );
                last_error = error;
            }
        }
    }

    if let Some(fallback) = &config.fallback_url {
        log::warn!("model discovery exhausted retries, trying static fallback at {fallback}");

        match fetch_document(client, fallback.as_str(), config.timeout).await {
            Ok(records) => return Ok(records),
            Err(error) => last_error = format!("fallback failed: {error}"),
        }
    }

    Err(FanoutError::RegistryUnavailable(last_error))
}

async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> std::result::Result<Vec<ModelRecord>, String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| format!("request failed: {error}"))?;

    let status = response.status();

    if !status.is_success() {
        return Err(format!("discovery endpoint answered {status}"));
    }

    let body = response
        .text()
        .await
        .map_err(|error| format!("failed to read discovery body: {error}"))?;

    if body.trim().is_empty() {
        return Err("discovery body was empty".to_string());
    }

    let document: DiscoveryDocument =
        sonic_rs::from_str(&body).map_err(|error| format!("malformed discovery document: {error}"))?;

    let records: Vec<ModelRecord> = document
        .models
        .into_iter()
        .filter_map(DiscoveredModel::into_record)
        .collect();

    if records.is_empty() {
        return Err("discovery document lists no models".to_string());
    }

    Ok(records)
}
