//! Extraction configuration and retry policy

use std::time::Duration;

/// Default OpenAQ v3 base URL
pub const DEFAULT_API_BASE: &str = "https://api.openaq.org/v3";

/// Page size requested from paginated endpoints (provider maximum)
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// Maximum number of retries for transient failures
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Minimum pause after a 429 before the single extra attempt
pub const RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Requests admitted per rolling minute
pub const REQUESTS_PER_MINUTE: usize = 60;

/// Requests admitted per rolling hour
pub const REQUESTS_PER_HOUR: usize = 2000;

/// Default object key prefix
pub const DEFAULT_OBJECT_PREFIX: &str = "bronze";

/// Default object-store region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Retry behaviour of the HTTP client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff
    pub max_backoff: Duration,
    /// Minimum pause after a 429
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            rate_limit_cooldown: Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS),
        }
    }
}

impl RetryPolicy {
    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry_count` (0-based), doubling and capped
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// OpenAQ API settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// API key sent as `X-API-Key`
    pub api_key: Option<String>,
    /// Base URL without trailing slash
    pub base_url: String,
    /// Page size for paginated endpoints
    pub page_limit: u32,
    /// Retry behaviour
    pub retry: RetryPolicy,
}

impl ApiSettings {
    /// Settings for the public API with default paging and retries
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_API_BASE.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the page size
    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The API key, if present and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// S3-compatible object store settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreSettings {
    /// Target bucket; its presence selects object storage by default
    pub bucket: Option<String>,
    /// Key prefix under which the partition layout is written
    pub prefix: String,
    /// Region name
    pub region: String,
    /// Custom endpoint for S3-compatible stores
    pub endpoint_url: Option<String>,
    /// Access key id
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: DEFAULT_OBJECT_PREFIX.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl ObjectStoreSettings {
    /// Configured bucket, ignoring blank values
    pub fn bucket(&self) -> Option<&str> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|bucket| !bucket.is_empty())
    }
}
