//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Create an HTTP client for provider calls.
///
/// Config: 30s connect timeout, `timeout_secs` request timeout, rustls TLS,
/// `arbor/{version}` user-agent, redirect limit 10.
#[must_use]
pub fn client_with_timeout(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("arbor/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}

#[must_use]
pub fn default_client() -> reqwest::Client {
    client_with_timeout(DEFAULT_TIMEOUT_SECS)
}
