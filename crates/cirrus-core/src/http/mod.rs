//! HTTP execution layer for Cirrus.
//!
//! Requests flow through two composed layers:
//!
//! - an [`Authorizer`] that supplies (and refreshes) the bearer credential
//!   for each attempt, and
//! - a [`RequestExecutor`] that applies bounded retry with exponential
//!   backoff and classifies outcomes into the error taxonomy.
//!
//! Both sit on the [`Transport`] seam so tests can script responses without
//! a network. Request bodies are held as [`Bytes`], so every retry replays
//! the body from its start.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A single outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    /// Extra headers as (name, value) pairs
    pub headers: Vec<(String, String)>,
    /// Request body, replayed in full on every retry
    pub body: Option<Bytes>,
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status code
    pub status: StatusCode,
    /// Response headers as (lowercase name, value) pairs
    pub headers: Vec<(String, String)>,
    /// Full response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Look up a response header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodingFailed`] if the body is not valid JSON of
    /// the expected shape.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

/// Seam between request execution and the actual network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP request, buffering the full response.
    ///
    /// Implementations return [`Error::NetworkFailed`] when no HTTP
    /// response was produced; non-2xx responses are returned as `Ok` and
    /// classified by the caller.
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;
}

/// Production [`Transport`] backed by [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(req.method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(n, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (n.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Supplies the bearer credential for outgoing requests.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Produce the current bearer token, refreshing it if necessary.
    ///
    /// `None` means the request is sent without an `Authorization` header.
    async fn bearer(&self) -> Result<Option<String>>;

    /// Mark the cached credential stale so the next [`Self::bearer`] call
    /// refreshes it. Invoked after a 401 response.
    async fn invalidate(&self);
}

/// [`Authorizer`] for pre-authorized URLs.
///
/// Upload/download session URLs are themselves time-limited credentials;
/// sending a bearer token alongside them is rejected by the server, so the
/// chunk path deliberately runs unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authorizer for NoAuth {
    async fn bearer(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn invalidate(&self) {}
}

/// Retry and backoff policy for [`RequestExecutor`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per logical request
    pub max_attempts: u32,
    /// Base backoff delay
    pub base_delay: Duration,
    /// Backoff delay ceiling
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the retry following `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }
}

/// Server error envelope: `{"error": {"code": "...", "message": "..."}}`.
///
/// The OAuth endpoints use the flat variant `{"error": "code",
/// "error_description": "..."}`; both shapes are tried during
/// classification.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Structured {
        code: String,
        #[serde(default)]
        message: Option<String>,
    },
    Code(String),
}

/// Classify a non-success response: structured server code first, HTTP
/// status mapping as the fallback.
#[must_use]
pub fn classify_response(response: &HttpResponse) -> Error {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&response.body) {
        let (code, message) = match envelope.error {
            ErrorBody::Structured { code, message } => {
                let message = message.unwrap_or_else(|| code.clone());
                (code, message)
            }
            ErrorBody::Code(code) => {
                let message = envelope
                    .error_description
                    .unwrap_or_else(|| code.clone());
                (code, message)
            }
        };
        if let Some(err) = Error::from_api_code(&code, message.clone()) {
            return err;
        }
        return Error::from_status(response.status, format!("{code}: {message}"));
    }

    let message = format!("HTTP {}", response.status);
    Error::from_status(response.status, message)
}

/// Executes one logical request with bounded retries.
///
/// Retries are attempted for 429/503 responses, transport-level failures,
/// and exactly one 401 (after invalidating the cached credential so the
/// next attempt carries a refreshed token). All other non-2xx responses
/// are classified and returned immediately.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    authorizer: Arc<dyn Authorizer>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Create an executor over the given transport and authorizer.
    pub fn new(
        transport: Arc<dyn Transport>,
        authorizer: Arc<dyn Authorizer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            authorizer,
            policy,
        }
    }

    /// Execute a request and return the successful response.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the last attempt once retries are
    /// exhausted, or immediately for non-retryable classifications.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<HttpResponse> {
        let mut reauth_attempted = false;

        for attempt in 1..=self.policy.max_attempts {
            let mut request_headers = headers.to_vec();
            if let Some(token) = self.authorizer.bearer().await? {
                request_headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            }

            let request = HttpRequest {
                method: method.clone(),
                url: url.to_string(),
                headers: request_headers,
                // Bytes clone is cheap; the replayed body always starts at
                // offset zero.
                body: body.clone(),
            };

            let (err, reauth_retry) = match self.transport.send(request).await {
                Ok(response) if response.status.is_success() => return Ok(response),
                Ok(response) => {
                    let err = classify_response(&response);
                    if response.status == StatusCode::UNAUTHORIZED && !reauth_attempted {
                        reauth_attempted = true;
                        self.authorizer.invalidate().await;
                        tracing::debug!(url, attempt, "401 response, refreshing credential");
                        (err, true)
                    } else {
                        (err, false)
                    }
                }
                Err(err) => (err, false),
            };

            let retryable = reauth_retry || err.is_retryable();
            if !retryable || attempt == self.policy.max_attempts {
                return Err(err);
            }
            let delay = self.policy.delay_for(attempt);
            tracing::debug!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }

        Err(Error::Internal(format!(
            "retry loop exited without outcome for {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(12), Duration::from_secs(10));
    }

    #[test]
    fn test_classify_structured_envelope() {
        let response = HttpResponse {
            status: StatusCode::NOT_FOUND,
            headers: Vec::new(),
            body: Bytes::from_static(
                br#"{"error":{"code":"itemNotFound","message":"The resource could not be found."}}"#,
            ),
        };

        assert!(matches!(
            classify_response(&response),
            Error::ResourceNotFound(_)
        ));
    }

    #[test]
    fn test_classify_oauth_envelope() {
        let response = HttpResponse {
            status: StatusCode::BAD_REQUEST,
            headers: Vec::new(),
            body: Bytes::from_static(
                br#"{"error":"authorization_pending","error_description":"waiting for user"}"#,
            ),
        };

        assert!(matches!(
            classify_response(&response),
            Error::AuthorizationPending(_)
        ));
    }

    #[test]
    fn test_classify_falls_back_to_status() {
        let response = HttpResponse {
            status: StatusCode::CONFLICT,
            headers: Vec::new(),
            body: Bytes::from_static(b"<html>not json</html>"),
        };
        assert!(matches!(classify_response(&response), Error::Conflict(_)));

        // Unknown structured code still maps through the status table.
        let response = HttpResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers: Vec::new(),
            body: Bytes::from_static(br#"{"error":{"code":"brandNewCode","message":"m"}}"#),
        };
        assert!(matches!(classify_response(&response), Error::RetryLater(_)));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status: StatusCode::PARTIAL_CONTENT,
            headers: vec![("content-range".to_string(), "bytes 0-9/100".to_string())],
            body: Bytes::new(),
        };

        assert_eq!(response.header("Content-Range"), Some("bytes 0-9/100"));
        assert_eq!(response.header("etag"), None);
    }
}
