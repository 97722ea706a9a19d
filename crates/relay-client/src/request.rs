//! Outbound request description
//!
//! Built fresh per call by the caller and handed to the client; the
//! client never caches these. Caller-supplied headers ride along but the
//! middleware's authentication headers always win on conflict.

use serde_json::Value;

/// An authenticated API call to make.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new("POST", url);
        request.body = Some(body);
        request
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new("PUT", url);
        request.body = Some(body);
        request
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    /// Attach a header. Authentication headers set by the middleware
    /// overwrite any same-named header supplied here.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
