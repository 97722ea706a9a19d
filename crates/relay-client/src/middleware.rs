//! Authentication middleware
//!
//! Turns "is there a usable credential?" into concrete request headers.
//! The middleware's headers always overwrite caller-supplied ones — a
//! caller must not be able to smuggle its own Authorization value past
//! the credential the manager issued.

use std::sync::Arc;
use std::time::Duration;

use relay_auth::AuthManager;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Proactive refresh window for [`AuthMiddleware::refresh_if_needed`].
pub const REFRESH_WINDOW: Duration = Duration::from_secs(600);

/// Renders the manager's credential as request headers.
pub struct AuthMiddleware {
    manager: Arc<AuthManager>,
}

impl AuthMiddleware {
    pub fn new(manager: Arc<AuthManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<AuthManager> {
        &self.manager
    }

    /// Attach authentication and standard JSON headers, overwriting any
    /// caller-supplied values for the same names.
    ///
    /// When no usable credential exists (refresh included), this starts a
    /// new authorization flow and returns its URL inside the error — the
    /// caller gets a ready-to-use interactive step, not a bare failure.
    pub async fn authenticate(&self, headers: &mut HeaderMap) -> Result<()> {
        let Some(token) = self.manager.get_valid_access_token().await else {
            let auth = self.manager.begin_authorization().await;
            debug!("no usable credential, authorization flow required");
            return Err(Error::AuthorizationRequired {
                authorize_url: Some(auth.url),
            });
        };

        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Validation("access token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(())
    }

    /// Whether a usable credential exists right now.
    ///
    /// This runs the full validation path, including a refresh attempt
    /// when the cached record is inside its expiry window — it is NOT a
    /// cheap flag read. Callers polling this under load will generate
    /// token-endpoint traffic; poll the result of a completed
    /// `authenticate` instead.
    pub async fn is_authenticated(&self) -> bool {
        self.manager.get_valid_access_token().await.is_some()
    }

    /// Refresh proactively when the credential expires within
    /// [`REFRESH_WINDOW`].
    ///
    /// Returns `false` only when an attempted refresh fails. `true` covers
    /// both "nothing needed doing" and "refresh succeeded" — callers that
    /// need to tell those apart must consult the store directly.
    pub async fn refresh_if_needed(&self) -> bool {
        if !self.manager.store().expires_within(REFRESH_WINDOW).await {
            return true;
        }
        match self.manager.refresh(None).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "proactive refresh failed");
                false
            }
        }
    }
}
