//! Authenticated HTTP client
//!
//! Request pipeline, in order: validate, rate-limit gate, credential
//! injection, send with retry/backoff, classify. Validation failures cost
//! no network or auth work; the rate-limit gate refuses only a known
//! exhaustion; retries cover network failures and 5xx/429 responses with
//! bounded exponential backoff; every other 4xx is terminal.

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{Instrument, debug, warn};

use common::HttpConfig;

use crate::error::{Error, Result};
use crate::middleware::AuthMiddleware;
use crate::ratelimit::{RateLimitSnapshot, RateLimitState};
use crate::request::ApiRequest;

/// Methods the client will send. Anything else is a validation error.
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Response body, parsed by declared content type.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// The JSON value, when the response declared and carried one.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// A completed (2xx) API call.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// Authenticated HTTP client with retry, backoff, and rate-limit awareness.
pub struct HttpClient {
    http: reqwest::Client,
    middleware: AuthMiddleware,
    rate: RateLimitState,
    timeout: Duration,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(config: &HttpConfig, middleware: AuthMiddleware) -> Self {
        Self {
            http: reqwest::Client::new(),
            middleware,
            rate: RateLimitState::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// The middleware backing this client.
    pub fn middleware(&self) -> &AuthMiddleware {
        &self.middleware
    }

    /// Last observed rate-limit window, if any response carried one.
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.rate.snapshot()
    }

    /// Execute one authenticated call through the full pipeline.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method,
            url = %request.url,
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = validate_method(&request.method)?;
        if request.url.trim().is_empty() {
            return Err(Error::Validation("URL must not be empty".into()));
        }

        if let Some(retry_in_secs) = self.rate.blocked_for_secs() {
            metrics::counter!("relay_rate_limited_total").increment(1);
            debug!(retry_in_secs, "rate limit exhausted, refusing to send");
            return Err(Error::RateLimited { retry_in_secs });
        }

        // Caller headers first; the middleware's overwrite on conflict.
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = match HeaderName::from_str(name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            let value = match HeaderValue::from_str(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.insert(name, value);
        }
        self.middleware.authenticate(&mut headers).await?;

        for attempt in 1..=self.max_retries {
            let mut outbound = self
                .http
                .request(method.clone(), &request.url)
                .headers(headers.clone())
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                outbound = outbound.json(body);
            }

            match outbound.send().await {
                Ok(response) => {
                    let status = response.status();
                    if (status.is_server_error() || status.as_u16() == 429)
                        && attempt < self.max_retries
                    {
                        warn!(attempt, status = status.as_u16(), "retryable status, backing off");
                        metrics::counter!("relay_request_retries_total").increment(1);
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return self.finish(response).await;
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(attempt, error = %e, "network failure, backing off");
                    metrics::counter!("relay_request_retries_total").increment(1);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(e) => {
                    metrics::counter!("relay_requests_total", "status" => "network_error")
                        .increment(1);
                    return Err(Error::Network(format!(
                        "request failed after {} attempts: {e}",
                        self.max_retries
                    )));
                }
            }
        }

        // Loop always returns within max_retries iterations
        Err(Error::Network("retry loop exhausted unexpectedly".into()))
    }

    /// Classify the final response: record rate-limit headers, parse the
    /// body by content type, map non-2xx statuses onto the error taxonomy.
    async fn finish(&self, response: reqwest::Response) -> Result<ApiResponse> {
        self.rate.update_from_headers(response.headers());

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        metrics::counter!("relay_requests_total", "status" => status.to_string()).increment(1);

        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("reading response body: {e}")))?;

        if !(200..300).contains(&status) {
            if status == 401 || status == 403 {
                debug!(status, "authentication rejected by remote");
                return Err(Error::AuthorizationRequired {
                    authorize_url: None,
                });
            }
            return Err(Error::Http {
                status,
                message: text,
            });
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let body = if text.is_empty() {
            ResponseBody::Empty
        } else if content_type.starts_with("application/json") {
            match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => {
                    warn!(error = %e, "declared JSON body failed to parse, keeping text");
                    ResponseBody::Text(text)
                }
            }
        } else {
            ResponseBody::Text(text)
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Check the method against the allowed set and convert it.
fn validate_method(method: &str) -> Result<reqwest::Method> {
    let normalized = method.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(Error::Validation("method must not be empty".into()));
    }
    if !ALLOWED_METHODS.contains(&normalized.as_str()) {
        return Err(Error::Validation(format!(
            "method {method:?} not allowed (expected one of {ALLOWED_METHODS:?})"
        )));
    }
    reqwest::Method::from_bytes(normalized.as_bytes())
        .map_err(|e| Error::Validation(format!("invalid method: {e}")))
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = INITIAL_BACKOFF_MS.saturating_mul(1 << (attempt - 1).min(16));
    Duration::from_millis(exp.min(MAX_BACKOFF_MS))
}
