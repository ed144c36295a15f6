use std::{sync::OnceLock, time::Duration};

use reqwest::Client;

/// Shared HTTP client for every upstream conversation.
///
/// No whole-request timeout: chat streams are long-lived and end when the
/// upstream closes them or the caller cancels. Discovery fetches and health
/// probes attach their own per-request timeouts instead.
pub(crate) fn http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            Client::builder()
                .connect_timeout(Duration::from_secs(10))
                // Short idle timeout so DNS changes on volatile free-tier
                // hosts are picked up between requests.
                .pool_idle_timeout(Some(Duration::from_secs(5)))
                .tcp_nodelay(true)
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .build()
                .expect("Failed to build default HTTP client")
        })
        .clone()
}
