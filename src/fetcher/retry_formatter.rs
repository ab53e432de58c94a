//! Retry message formatting for the OpenAQ HTTP client.
//!
//! Classifies failed attempts and renders consistent log lines for retries, recoveries
//! and final failures.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Network timeout or connection stalled long enough to trigger a timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400/422 invalid request parameters
    InvalidRequest(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest(_) => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "authentication failed (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                410 => "resource no longer available",
                _ => "client error",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented with actionable guidance after failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Wait for the hourly quota to reset before re-running",
            Self::ServerError(_) => "OpenAQ may be experiencing issues, try again later",
            Self::InvalidRequest(_) => "Check the zone bbox and the --from/--to range",
            Self::AuthFailed(_) => "Verify OPENAQ_API_KEY is set to a valid key",
            Self::ClientError(_) => "Review request parameters against the OpenAQ v3 API",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Determine whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RetryErrorType::InvalidRequest(_)
                | RetryErrorType::AuthFailed(_)
                | RetryErrorType::ClientError(_)
        )
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Wait until the next attempt
    pub backoff_duration: Duration,
    /// Resource being fetched (e.g. "sensor 1234 measurements")
    pub resource: String,
    /// Original error message for details
    pub error_message: String,
    /// Endpoint that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        resource: impl Into<String>,
        error_message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            resource: resource.into(),
            error_message: error_message.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_resource(&mut message, &self.resource);
        message
    }

    /// Format the cooldown message logged after a 429.
    pub fn format_cooldown(&self) -> String {
        let mut message = format!(
            "Rate limited by provider - cooling down {:.1} seconds before one extra attempt",
            self.backoff_duration.as_secs_f64()
        );
        append_resource(&mut message, &self.resource);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded - resuming extraction",
            self.attempt, self.max_attempts
        );
        append_resource(&mut message, &self.resource);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "[FAILED] Request failed after {} attempts",
            self.attempt
        ));
        lines.push(format!("  Last error: {}", self.error_message));

        let resource_display = if self.resource.is_empty() {
            "unknown"
        } else {
            &self.resource
        };
        lines.push(format!("  Resource: {resource_display}"));
        lines.push(format!("  Endpoint: {}", self.endpoint));
        lines.push("  Suggestions:".to_string());

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions.push("Check the OpenAQ API documentation at https://docs.openaq.org".to_string());
        suggestions
    }
}

/// Extract a [`RetryErrorType`] from an HTTP status or reqwest error.
pub fn extract_error_type(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> RetryErrorType {
    if let Some(status) = status {
        match status.as_u16() {
            400 | 422 => return RetryErrorType::InvalidRequest(status.as_u16()),
            401 | 403 => return RetryErrorType::AuthFailed(status.as_u16()),
            429 => return RetryErrorType::RateLimit,
            _ => {}
        }

        if status.is_server_error() {
            return RetryErrorType::ServerError(status.as_u16());
        }

        if status.is_client_error() {
            return RetryErrorType::ClientError(status.as_u16());
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return RetryErrorType::NetworkTimeout;
        }

        if err.is_connect() {
            return RetryErrorType::NetworkOffline;
        }
    }

    RetryErrorType::NetworkGeneric
}

fn append_resource(buffer: &mut String, resource: &str) {
    if !resource.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(resource);
        buffer.push(')');
    }
}
