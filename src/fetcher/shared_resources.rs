//! Shared resources for all fetcher instances
//!
//! OpenAQ enforces its quotas per API key, so every fetcher of a process must admit its
//! requests through the same rate limiter and reuse one connection pool.

use once_cell::sync::{Lazy, OnceCell};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::rate_limit::RateLimiter;
use crate::ingest::ConfigError;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

static GLOBAL_HTTP_CLIENT: OnceCell<Arc<Client>> = OnceCell::new();

/// Global rate limiter for OpenAQ endpoints (60/minute, 2000/hour)
pub static GLOBAL_OPENAQ_RATE_LIMITER: Lazy<Arc<RateLimiter>> =
    Lazy::new(|| Arc::new(RateLimiter::openaq()));

/// Build an HTTP client with explicit connect and request timeouts
pub fn build_http_client() -> Result<Client, ConfigError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Get the global HTTP client, building it on first use
pub fn global_http_client() -> Result<Arc<Client>, ConfigError> {
    GLOBAL_HTTP_CLIENT
        .get_or_try_init(|| build_http_client().map(Arc::new))
        .cloned()
}

/// Get the global OpenAQ rate limiter
pub fn global_openaq_rate_limiter() -> Arc<RateLimiter> {
    GLOBAL_OPENAQ_RATE_LIMITER.clone()
}
