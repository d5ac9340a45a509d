//! HTTP transport setup

use reqwest::Client;
use std::sync::Once;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::Result;

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the ring provider for rustls once per process
///
/// reqwest is built without a bundled provider, so one must be installed
/// before the first TLS handshake. Installing twice is harmless.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the HTTP client used for every backend call
pub fn build_http_client(config: &ApiConfig) -> Result<Client> {
    ensure_crypto_provider();

    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .tcp_nodelay(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(Into::into)
}
