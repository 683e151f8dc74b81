//! Resilient JSON request client shared by the Engine and Webflow clients.
//!
//! Every failure is mapped to an [`ErrorKind`] here, at the boundary, so the
//! rest of the crate matches on the enum instead of inspecting messages.
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{ApiError, ErrorKind};

/// Fixed delay schedule indexed by attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delays: Vec<Duration>,
    /// Wait applied on HTTP 429 when the response carries no `Retry-After`.
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: [1000, 2000, 4000, 5000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping. Used by tests and tools.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delays: vec![Duration::ZERO],
            rate_limit_wait: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    /// The last scheduled delay is reused past the end of the schedule.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(5))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    error!(label, kind = %err.kind, message = %err.message, "non-retryable error");
                    return Err(err);
                }
                if attempt + 1 >= max_attempts {
                    error!(
                        label,
                        kind = %err.kind,
                        attempts = max_attempts,
                        "max attempts reached"
                    );
                    return Err(err);
                }
                // A 429 already waited out its Retry-After before surfacing.
                let delay = if err.kind == ErrorKind::RateLimit {
                    Duration::ZERO
                } else {
                    policy.delay_for(attempt)
                };
                warn!(
                    label,
                    kind = %err.kind,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed; retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Map a non-success status and its body to a failure kind.
pub fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    if status.is_client_error() && is_image_import_failure(body) {
        return ErrorKind::ImageImport;
    }
    match status.as_u16() {
        401 | 403 => ErrorKind::AuthError,
        404 => ErrorKind::NotFoundError,
        429 => ErrorKind::RateLimit,
        400 | 409 | 422 if is_slug_conflict(body) => ErrorKind::SlugConflict,
        400 | 422 => ErrorKind::ValidationError,
        500..=599 => ErrorKind::ServerError,
        _ if body.contains("Validation failed") => ErrorKind::ValidationError,
        _ => ErrorKind::UnknownError,
    }
}

fn is_slug_conflict(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("slug")
        && (lower.contains("unique value is already in database")
            || lower.contains("already exists"))
}

fn is_image_import_failure(body: &str) -> bool {
    body.contains("Remote file failed to import") || body.contains("Unsupported file type")
}

/// Map a transport-level failure (no HTTP response) to a failure kind.
pub fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() {
        ErrorKind::NetworkError
    } else {
        ErrorKind::UnknownError
    }
}

fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    bearer: Option<String>,
    retry: RetryPolicy,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        bearer: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        // Url::join drops the last path segment unless it ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            ApiError::new(
                ErrorKind::ValidationError,
                format!("invalid base URL {}: {}", normalized, e),
            )
        })?;
        let http = Client::builder()
            .user_agent("engine-webflow-sync/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::new(ErrorKind::UnknownError, e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            bearer,
            retry,
        })
    }

    pub fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ApiError> {
        let url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| {
                ApiError::new(
                    ErrorKind::ValidationError,
                    format!("invalid endpoint {}: {}", endpoint, e),
                )
            })?;
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = &self.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }
        builder
            .build()
            .map_err(|e| ApiError::new(ErrorKind::UnknownError, e.to_string()))
    }

    /// Issue a request with retries. Returns `None` for 204, DELETE and empty bodies.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let label = format!("{} {}", method, endpoint);
        retry_with_backoff(&self.retry, &label, || {
            self.send_once(method.clone(), endpoint, query, body)
        })
        .await
    }

    /// Like [`ApiClient::request`] but decodes the body into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(method, endpoint, query, body).await?.ok_or_else(|| {
            ApiError::new(
                ErrorKind::UnknownError,
                format!("empty response from {}", endpoint),
            )
        })?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::new(
                ErrorKind::UnknownError,
                format!("unexpected response shape from {}: {}", endpoint, e),
            )
        })
    }

    async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let request = self.build_request(method.clone(), endpoint, query, body)?;
        debug!(method = %method, url = %request.url(), "sending request");

        let res = self.http.execute(request).await.map_err(|e| {
            let kind = classify_transport(&e);
            ApiError::new(kind, format!("{} {} failed: {}", method, endpoint, e))
        })?;
        let status = res.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = res
                .headers()
                .get(RETRY_AFTER)
                .and_then(parse_retry_after)
                .unwrap_or(self.retry.rate_limit_wait);
            warn!(endpoint, wait_secs = wait.as_secs(), "rate limited; waiting");
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            return Err(ApiError::with_status(
                ErrorKind::RateLimit,
                status.as_u16(),
                format!("rate limit exceeded; waited {}s", wait.as_secs()),
            ));
        }

        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let kind = classify_status(status, &text);
            warn!(endpoint, status = status.as_u16(), %kind, "request failed");
            return Err(ApiError::with_status(
                kind,
                status.as_u16(),
                format!("{} - {}", status, text),
            ));
        }

        if status == StatusCode::NO_CONTENT || method == Method::DELETE {
            return Ok(None);
        }

        let text = res.text().await.map_err(|e| {
            ApiError::new(classify_transport(&e), format!("failed to read body: {}", e))
        })?;
        if text.trim().is_empty() {
            warn!(endpoint, "empty response body");
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|e| {
            ApiError::with_status(
                ErrorKind::UnknownError,
                status.as_u16(),
                format!("invalid JSON from {}: {}", endpoint, e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classify_common_statuses() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, ""), ErrorKind::AuthError);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, ""), ErrorKind::AuthError);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), ErrorKind::NotFoundError);
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad"),
            ErrorKind::ValidationError
        );
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, ""), ErrorKind::ServerError);
        assert_eq!(classify_status(StatusCode::IM_A_TEAPOT, ""), ErrorKind::UnknownError);
        assert_eq!(
            classify_status(StatusCode::IM_A_TEAPOT, "Validation failed: name"),
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn classify_refinements_from_body() {
        let body = r#"{"message":"Validation Error","details":[{"param":"slug","description":"Unique value is already in database: 'hello'"}]}"#;
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, body), ErrorKind::SlugConflict);
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "Remote file failed to import"),
            ErrorKind::ImageImport
        );
    }

    #[test]
    fn delay_schedule_reuses_last_entry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(9), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retry_stops_on_terminal_error() {
        let calls = AtomicU32::new(0);
        let res: Result<(), ApiError> = retry_with_backoff(&RetryPolicy::immediate(5), "t", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::new(ErrorKind::AuthError, "denied")) }
        })
        .await;
        assert_eq!(res.unwrap_err().kind, ErrorKind::AuthError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_exhausts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let res: Result<(), ApiError> = retry_with_backoff(&RetryPolicy::immediate(3), "t", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ApiError::new(ErrorKind::ServerError, format!("boom {}", n))) }
        })
        .await;
        let err = res.unwrap_err();
        assert_eq!(err.message, "boom 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);
        let res = retry_with_backoff(&RetryPolicy::immediate(3), "t", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::new(ErrorKind::Timeout, "slow"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 1);
    }

    #[test]
    fn build_request_sets_headers_and_query() {
        let client = ApiClient::new(
            "https://api.example.com/v2",
            Some("token".into()),
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        )
        .unwrap();
        let body = serde_json::json!({ "sample": true });
        let request = client
            .build_request(
                Method::POST,
                "/collections/c1/items",
                &[("offset".into(), "0".into())],
                Some(&body),
            )
            .unwrap();
        assert_eq!(request.url().path(), "/v2/collections/c1/items");
        assert_eq!(request.url().query(), Some("offset=0"));
        let headers = request.headers();
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()),
            Some("Bearer token")
        );
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|h| h.to_str().ok()),
            Some("application/json")
        );
    }
}
