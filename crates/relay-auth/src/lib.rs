//! OAuth authorization library for the relay pipeline
//!
//! Provides PKCE flow generation, token exchange/refresh, an encrypted
//! TTL-bounded token store, and the authorization manager tying them
//! together. Standalone library with no dependency on the HTTP client
//! crate — it can be tested and used independently.
//!
//! Credential flow:
//! 1. Caller asks `AuthManager::begin_authorization()` for a URL + state
//! 2. User authorizes in a browser, the redirect carries code + state
//! 3. Caller runs `AuthManager::exchange_code(code, state)`
//! 4. Credential sealed and persisted via `TokenStore`
//! 5. `AuthManager::get_valid_access_token()` serves it, refreshing once
//!    when the record enters its expiry window
//! 6. `AuthManager::logout()` (or a failed refresh) clears the session

pub mod error;
pub mod manager;
pub mod pkce;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use manager::{AuthManager, AuthorizationRequest, PENDING_TTL};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use store::{MAX_TOKEN_TTL, TokenRecord, TokenStore, VALIDITY_BUFFER};
pub use token::{TokenResponse, exchange_code, refresh_token};
