//! Retry policy with exponential backoff for idempotent HTTP requests.

use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base of the exponential backoff: the n-th retry waits `backoff_factor * 2^(n-1)` seconds
    pub backoff_factor: f64,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 0.75,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Set the retry budget
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff factor (seconds)
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// A policy that never waits between attempts. Used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_factor: 0.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let secs = self.backoff_factor * 2f64.powi(retry as i32 - 1);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient failures that should trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    /// Connection could not be established or was dropped
    Network,
    /// Connect or read timeout
    Timeout,
    /// HTTP 429
    TooManyRequests,
    /// HTTP 500, 502, 503 or 504
    ServerError(u16),
}

impl TransientError {
    /// Classify a transport error. Builder and redirect errors are permanent.
    pub fn from_reqwest_error(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            return Some(TransientError::Timeout);
        }
        if err.is_connect() || err.is_request() || err.is_body() {
            return Some(TransientError::Network);
        }
        None
    }

    /// Classify a response status.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status.as_u16() {
            429 => Some(TransientError::TooManyRequests),
            code @ (500 | 502 | 503 | 504) => Some(TransientError::ServerError(code)),
            _ => None,
        }
    }
}

/// Only safe, idempotent methods are ever retried.
pub fn is_retryable_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}
