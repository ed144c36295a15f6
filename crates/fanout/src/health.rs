//! Background availability probing for self-hosted models.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::http_client::http_client;
use crate::registry::{Availability, ModelRegistry};

/// Handle to the background probe loop.
///
/// The loop waits out a short grace period after registry load, then probes
/// every self-hosted record once per interval. Dropping the handle (or
/// calling [`HealthProber::shutdown`]) cancels the loop promptly; an
/// outstanding cycle is abandoned, not awaited.
pub struct HealthProber {
    shutdown: CancellationToken,
}

impl HealthProber {
    pub fn spawn(registry: ModelRegistry, discovery: config::DiscoveryConfig, health: config::HealthConfig) -> Self {
        let shutdown = CancellationToken::new();

        if !health.enabled {
            log::debug!("health probing is disabled, not spawning the probe loop");
            return Self { shutdown };
        }

        let token = shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(health.grace) => {}
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = run_cycle(&registry, &discovery, &health) => {}
                }

                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(health.interval) => {}
                }
            }
        });

        Self { shutdown }
    }

    /// Stop the probe loop without waiting for an in-flight cycle.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Probe every self-hosted record once, in parallel, and record the results.
///
/// Cycles never overlap: the background loop runs them back to back, and
/// one-shot callers (the CLI before a chat turn) await the whole cycle.
pub async fn run_cycle(registry: &ModelRegistry, discovery: &config::DiscoveryConfig, health: &config::HealthConfig) {
    let ids = registry.self_hosted_ids();

    if ids.is_empty() {
        return;
    }

    let client = http_client();

    let mut probes = ids
        .into_iter()
        .map(|id| {
            let client = client.clone();
            let url = discovery.status_url(&id);
            let timeout = health.timeout;

            async move {
                let availability = probe_status(&client, &url, timeout).await;
                (id, availability)
            }
        })
        .collect::<FuturesUnordered<_>>();

    while let Some((id, availability)) = probes.next().await {
        if registry.set_availability(&id, availability) {
            log::info!("model {id} is now {availability}");
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Anything other than a 2xx response saying `"online"` counts as offline.
async fn probe_status(client: &reqwest::Client, url: &str, timeout: std::time::Duration) -> Availability {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(error) => {
            log::debug!("status probe of {url} failed: {error}");
            return Availability::Offline;
        }
    };

    if !response.status().is_success() {
        return Availability::Offline;
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => return Availability::Offline,
    };

    match sonic_rs::from_str::<StatusResponse>(&body) {
        Ok(status) if status.status.as_deref() == Some("online") => Availability::Online,
        _ => Availability::Offline,
    }
}
