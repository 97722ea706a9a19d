//! Error taxonomy for authenticated request execution
//!
//! Every failure carries its kind from the point of origin — nothing
//! downstream infers meaning from message text. AuthorizationRequired is
//! an expected, recoverable condition: callers route it into the
//! interactive flow instead of treating it as a crash.

/// Classification of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AuthorizationRequired,
    RateLimited,
    Network,
    Http,
}

/// Errors from the authenticated request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    /// No usable credential and refresh failed. Carries a ready-to-use
    /// authorization URL when the middleware produced one.
    #[error("authorization required")]
    AuthorizationRequired { authorize_url: Option<String> },

    #[error("rate limited, retry in {retry_in_secs} seconds")]
    RateLimited { retry_in_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl Error {
    /// The tagged kind, for callers branching on failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::AuthorizationRequired { .. } => ErrorKind::AuthorizationRequired,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Network(_) => ErrorKind::Network,
            Error::Http { .. } => ErrorKind::Http,
        }
    }
}

/// Result alias for request execution.
pub type Result<T> = std::result::Result<T, Error>;
