//! OpenAQ HTTP client helper module
//!
//! Provides the single HTTP client used for all OpenAQ API interactions with:
//! - API key authentication
//! - Rate limiter admission before every attempt
//! - Retry logic with exponential backoff
//! - A one-time cooldown after a 429 response

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::fetcher::openaq_config::{OpenAqEndpoints, OPENAQ_V3};
use crate::fetcher::retry_formatter::{extract_error_type, RetryContext, RetryErrorType};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::ingest::config::RetryPolicy;
use crate::ingest::rate_limit::RateLimiter;
use crate::ingest::ConfigError;
use crate::metrics::{record_rate_limit_remaining, record_retry_backoff, HttpRequestMetrics};

/// Unified HTTP client for all OpenAQ API interactions
pub struct OpenAqHttpClient {
    client: Arc<Client>,
    base_url: String,
    api_key: HeaderValue,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    endpoints: &'static OpenAqEndpoints,
}

/// How a failed attempt should be handled
enum AttemptFailure {
    /// Retry with backoff while the budget lasts
    Transient(RetryErrorType, FetcherError),
    /// Pause for the cooldown, then retry once without consuming the budget
    Cooldown(Duration),
    /// Give up immediately
    Fatal(FetcherError),
}

impl OpenAqHttpClient {
    /// Create new HTTP client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `base_url` - Base URL for API endpoints (e.g., "<https://api.openaq.org/v3>")
    /// * `api_key` - Provider API key
    /// * `rate_limiter` - Shared rate limiter (Arc for global quota enforcement)
    /// * `retry` - Retry and cooldown policy
    ///
    /// # Errors
    /// [`ConfigError::MissingApiKey`] for a blank key, [`ConfigError::InvalidApiKey`] when it
    /// cannot be sent as a header.
    pub fn new(
        client: Arc<Client>,
        base_url: impl Into<String>,
        api_key: &str,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let mut api_key = HeaderValue::from_str(api_key).map_err(|_| ConfigError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
            retry,
            endpoints: &OPENAQ_V3,
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute a GET request and return the decoded JSON body
    ///
    /// # Arguments
    /// * `endpoint` - API endpoint path (e.g., "/locations")
    /// * `params` - Query parameters as key-value pairs
    /// * `resource` - Human-readable description used in log messages
    ///
    /// # Errors
    /// Returns FetcherError on network, parse, or API errors
    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        resource: &str,
    ) -> FetcherResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Making GET request to: {} with {} params", url, params.len());

        self.request_with_retry(&url, endpoint, params, resource)
            .await
    }

    /// Retry loop
    ///
    /// Retries on network errors and 5xx responses up to `max_retries` times. The first
    /// 429 triggers a cooldown followed by one extra attempt that does not count against
    /// the budget; later 429s are retried like server errors. Other 4xx responses fail
    /// immediately.
    async fn request_with_retry(
        &self,
        url: &str,
        endpoint: &str,
        params: &[(&str, String)],
        resource: &str,
    ) -> FetcherResult<Value> {
        let max_attempts = self.retry.max_retries + 1;
        let mut retries_used: u32 = 0;
        let mut cooldown_used = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.rate_limiter.admit().await;

            let failure = match self.attempt(url, endpoint, params, attempt).await {
                Ok(body) => {
                    if attempt > 1 {
                        let ctx = RetryContext::new(
                            retries_used + 1,
                            max_attempts,
                            RetryErrorType::NetworkGeneric,
                            Duration::ZERO,
                            resource,
                            "",
                            endpoint,
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(body);
                }
                Err(AttemptFailure::Fatal(fatal)) => {
                    let error_type = match &fatal {
                        FetcherError::ClientError { status, .. } => StatusCode::from_u16(*status)
                            .map(|s| extract_error_type(Some(s), None))
                            .unwrap_or(RetryErrorType::NetworkGeneric),
                        _ => RetryErrorType::NetworkGeneric,
                    };
                    let ctx = RetryContext::new(
                        attempt,
                        max_attempts,
                        error_type,
                        Duration::ZERO,
                        resource,
                        fatal.to_string(),
                        endpoint,
                    );
                    error!("{}", ctx.format_failure());
                    return Err(fatal);
                }
                Err(failure) => failure,
            };

            match failure {
                AttemptFailure::Cooldown(cooldown) if !cooldown_used => {
                    cooldown_used = true;
                    let ctx = RetryContext::new(
                        attempt,
                        max_attempts,
                        RetryErrorType::RateLimit,
                        cooldown,
                        resource,
                        FetcherError::RateLimitExceeded.to_string(),
                        endpoint,
                    );
                    warn!("{}", ctx.format_cooldown());
                    record_retry_backoff(cooldown, attempt);
                    tokio::time::sleep(cooldown).await;
                }
                failure => {
                    let (error_type, last_error) = match failure {
                        AttemptFailure::Transient(error_type, err) => (error_type, err),
                        AttemptFailure::Cooldown(_) => {
                            (RetryErrorType::RateLimit, FetcherError::RateLimitExceeded)
                        }
                        AttemptFailure::Fatal(err) => return Err(err),
                    };

                    if retries_used >= self.retry.max_retries {
                        let ctx = RetryContext::new(
                            attempt,
                            max_attempts,
                            error_type,
                            Duration::ZERO,
                            resource,
                            last_error.to_string(),
                            endpoint,
                        );
                        error!("{}", ctx.format_failure());
                        return Err(last_error);
                    }

                    let backoff = self.retry.backoff(retries_used);
                    retries_used += 1;
                    let ctx = RetryContext::new(
                        retries_used + 1,
                        max_attempts,
                        error_type,
                        backoff,
                        resource,
                        last_error.to_string(),
                        endpoint,
                    );
                    warn!("{}", ctx.format_retry());
                    record_retry_backoff(backoff, retries_used);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Perform one HTTP attempt
    async fn attempt(
        &self,
        url: &str,
        endpoint: &str,
        params: &[(&str, String)],
        attempt: u32,
    ) -> Result<Value, AttemptFailure> {
        let metrics = HttpRequestMetrics::start(endpoint, attempt).await;

        let response = match self
            .client
            .get(url)
            .header(self.endpoints.api_key_header, self.api_key.clone())
            .query(params)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                metrics.record_network_error();
                let error_type = extract_error_type(None, Some(&e));
                return Err(AttemptFailure::Transient(
                    error_type,
                    FetcherError::NetworkError(e.to_string()),
                ));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if let Some(remaining) =
            self.parse_u32_header(response.headers(), self.endpoints.rate_limit_remaining_header)
        {
            record_rate_limit_remaining(remaining);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let cooldown = self.cooldown_for(response.headers());
            return Err(AttemptFailure::Cooldown(cooldown));
        }

        if status.is_server_error() {
            return Err(AttemptFailure::Transient(
                RetryErrorType::ServerError(status.as_u16()),
                FetcherError::HttpError(format!("Server error: {status}")),
            ));
        }

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Fatal(FetcherError::ClientError {
                status: status.as_u16(),
                body,
            }));
        }

        if !status.is_success() {
            return Err(AttemptFailure::Fatal(FetcherError::ApiError(format!(
                "Unexpected status {status}"
            ))));
        }

        // A stalled or truncated body fails like a dropped connection
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                metrics.record_network_error();
                let error_type = if e.is_timeout() {
                    RetryErrorType::NetworkTimeout
                } else {
                    extract_error_type(None, Some(&e))
                };
                return Err(AttemptFailure::Transient(
                    error_type,
                    FetcherError::NetworkError(format!("Failed to read response body: {e}")),
                ));
            }
        };

        serde_json::from_slice::<Value>(&body).map_err(|e| {
            AttemptFailure::Fatal(FetcherError::ParseError(format!(
                "Failed to deserialize response: {e}"
            )))
        })
    }

    /// Cooldown after a 429: the policy minimum, or the provider's reset hint if longer
    fn cooldown_for(&self, headers: &HeaderMap) -> Duration {
        let reset = self
            .parse_u32_header(headers, self.endpoints.rate_limit_reset_header)
            .map(|secs| Duration::from_secs(u64::from(secs)))
            .unwrap_or(Duration::ZERO);
        reset.max(self.retry.rate_limit_cooldown)
    }

    fn parse_u32_header(&self, headers: &HeaderMap, name: &str) -> Option<u32> {
        let raw = headers.get(name)?.to_str().ok()?;

        match raw.trim().parse::<u32>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to parse header {} '{}': {}", name, raw, e);
                None
            }
        }
    }
}
