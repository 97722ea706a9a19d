//! Error types for authorization operations

/// Errors from PKCE flows, token-endpoint calls, and the token store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid or expired state: {0}")]
    InvalidState(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("invalid token record: {0}")]
    InvalidRecord(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for authorization operations.
pub type Result<T> = std::result::Result<T, Error>;
