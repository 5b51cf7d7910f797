//! HTTP client utilities.
//!
//! [`HttpClient`] wraps one pooled `reqwest::Client` for the whole run and
//! retries idempotent requests on transient failures (429, 500, 502, 503,
//! 504, connect/read errors and timeouts). Everything else, including other
//! 4xx responses, is handed straight back to the caller.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Method, Response};

use super::retry::{is_retryable_method, RetryConfig, TransientError};
use crate::config::HttpConfig;

/// Errors raised by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Shared HTTP client with an identifying user agent and bounded retries
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, HttpError> {
        Self::from_config(&HttpConfig::default())
    }

    /// Create a client from the `[http]` configuration section
    pub fn from_config(config: &HttpConfig) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/pdf,application/json,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self {
            client,
            retry: config.retry_config(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GET with retries
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.execute(Method::GET, url, &[]).await
    }

    /// GET with query parameters appended to `url`
    pub async fn get_with_query(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, HttpError> {
        self.execute(Method::GET, url, query).await
    }

    /// Send a request, retrying transient failures for idempotent methods.
    ///
    /// When the retry budget runs out the last response (or error) is returned
    /// as-is, so callers still see e.g. the final 429.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, HttpError> {
        let url = build_url(url, query)?;
        let max_retries = if is_retryable_method(&method) {
            self.retry.max_retries
        } else {
            0
        };

        let mut retry = 0;
        loop {
            let result = self.client.request(method.clone(), url.clone()).send().await;

            let transient = match &result {
                Ok(response) => TransientError::from_status(response.status()),
                Err(err) => TransientError::from_reqwest_error(err),
            };

            match transient {
                Some(kind) if retry < max_retries => {
                    retry += 1;
                    let delay = self.retry.delay_for(retry);
                    tracing::debug!(
                        "Transient {:?} from {}, retry {}/{} in {:?}",
                        kind,
                        url,
                        retry,
                        max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    return result.map_err(|source| HttpError::Request {
                        url: url.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

fn build_url(url: &str, query: &[(&str, &str)]) -> Result<url::Url, HttpError> {
    let parsed = if query.is_empty() {
        url::Url::parse(url)
    } else {
        url::Url::parse_with_params(url, query)
    };

    parsed.map_err(|e| HttpError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
