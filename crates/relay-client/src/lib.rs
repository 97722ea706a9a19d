//! Authenticated HTTP execution for the relay pipeline
//!
//! Layers credential injection, retry/backoff, rate-limit awareness, and
//! tagged error classification over a plain HTTP client. Construction is
//! explicit: build a `TokenStore` and `AuthManager` from `relay-auth`,
//! wrap the manager in an `AuthMiddleware`, and hand it to `HttpClient`.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use relay_auth::{AuthManager, TokenStore};
//! use relay_client::{ApiRequest, AuthMiddleware, HttpClient};
//!
//! let config = common::Config::load(std::path::Path::new("relay.toml"))?;
//! let store = Arc::new(
//!     TokenStore::open(config.store.path.clone(), config.store.encryption_key.as_ref()).await?,
//! );
//! let manager = Arc::new(AuthManager::new(config.oauth, store, reqwest::Client::new()));
//! let client = HttpClient::new(&config.http, AuthMiddleware::new(manager));
//!
//! let response = client
//!     .execute(ApiRequest::get("https://api.example.com/records"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod middleware;
pub mod ratelimit;
pub mod request;

pub use client::{ApiResponse, HttpClient, ResponseBody};
pub use error::{Error, ErrorKind, Result};
pub use middleware::{AuthMiddleware, REFRESH_WINDOW};
pub use ratelimit::{RateLimitSnapshot, RateLimitState};
pub use request::ApiRequest;
