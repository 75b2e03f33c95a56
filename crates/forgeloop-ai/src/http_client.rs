//! reqwest client shared by the text-generation providers.

use std::time::Duration;

use reqwest::Client;

/// Set to bypass any system proxy (local test servers, air-gapped runs).
const DISABLE_SYSTEM_PROXY_ENV: &str = "FORGELOOP_DISABLE_SYSTEM_PROXY";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_http_client() -> Client {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("forgeloop/", env!("CARGO_PKG_VERSION")));
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() || cfg!(test) {
        builder = builder.no_proxy();
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Falling back to a default HTTP client");
        Client::new()
    })
}
