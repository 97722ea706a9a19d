//! Authorization flow orchestration
//!
//! Owns the pending PKCE challenge set and drives code exchange and
//! refresh against the token endpoint, writing results through the token
//! store. Constructed explicitly and shared via `Arc`; one manager
//! represents one authenticated identity.
//!
//! Refresh policy: a failed refresh (network or endpoint rejection)
//! clears the whole store before the error propagates. A half-valid
//! session is worse than none, and a cleared store forces a fresh
//! interactive authorization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::OAuthConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pkce;
use crate::store::{self, TokenRecord, TokenStore};
use crate::token::{self, TokenResponse};

/// How long a pending challenge stays exchangeable. An unexchanged entry
/// older than this is rejected and swept; without a bound the pending set
/// grows for the life of the process.
pub const PENDING_TTL: Duration = Duration::from_secs(600);

/// Everything the caller needs to run the interactive step.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

struct PendingChallenge {
    verifier: String,
    created_at: Instant,
}

/// Drives the PKCE authorization flow against one token endpoint.
pub struct AuthManager {
    oauth: OAuthConfig,
    store: Arc<TokenStore>,
    http: reqwest::Client,
    pending: Mutex<HashMap<String, PendingChallenge>>,
    /// Coalesces concurrent refresh attempts: every waiter queues here and
    /// re-checks the store after acquiring, so N callers in the expiry
    /// window produce one token-endpoint call.
    refresh_gate: Mutex<()>,
}

impl AuthManager {
    pub fn new(oauth: OAuthConfig, store: Arc<TokenStore>, http: reqwest::Client) -> Self {
        Self {
            oauth,
            store,
            http,
            pending: Mutex::new(HashMap::new()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The token store this manager writes through.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Start an authorization flow: generate the PKCE material and state,
    /// register the pending challenge, and return the authorization URL.
    ///
    /// The pending entry is inserted only after URL construction, so a
    /// failure partway through never leaves an orphaned entry. Stale
    /// entries are swept here.
    pub async fn begin_authorization(&self) -> AuthorizationRequest {
        let code_verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&code_verifier);
        let state = pkce::generate_state();
        let url = pkce::build_authorization_url(&self.oauth, &state, &challenge);

        let mut pending = self.pending.lock().await;
        pending.retain(|_, c| c.created_at.elapsed() <= PENDING_TTL);
        pending.insert(
            state.clone(),
            PendingChallenge {
                verifier: code_verifier.clone(),
                created_at: Instant::now(),
            },
        );
        debug!(pending = pending.len(), "authorization flow started");

        AuthorizationRequest {
            url,
            state,
            code_verifier,
        }
    }

    /// Exchange an authorization code for a credential.
    ///
    /// The pending entry is removed before any network I/O — a state value
    /// satisfies exactly one exchange attempt, successful or not, which is
    /// what rejects replayed or mismatched callbacks.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<()> {
        let challenge = {
            let mut pending = self.pending.lock().await;
            pending.remove(state)
        }
        .ok_or_else(|| Error::InvalidState(state.to_string()))?;

        if challenge.created_at.elapsed() > PENDING_TTL {
            return Err(Error::InvalidState(state.to_string()));
        }

        let response =
            token::exchange_code(&self.http, &self.oauth, code, &challenge.verifier).await?;
        let record = record_from_response(response, None)?;
        self.store.store(record).await?;
        info!("authorization code exchanged, credential stored");
        Ok(())
    }

    /// Refresh the credential using the supplied refresh token, or the
    /// stored one when none is given.
    ///
    /// Fails with [`Error::NoRefreshToken`] before any network I/O when
    /// neither exists. Any later failure clears the store first.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<()> {
        let token = match refresh_token {
            Some(t) => t.to_string(),
            None => self
                .store
                .refresh_token()
                .await
                .ok_or(Error::NoRefreshToken)?,
        };

        let result: Result<()> = async {
            let response = token::refresh_token(&self.http, &self.oauth, &token).await?;
            // A response may omit the refresh token; the one just used
            // stays valid in that case.
            let record = record_from_response(response, Some(token.clone()))?;
            self.store.store(record).await
        }
        .await;

        match result {
            Ok(()) => {
                info!("token refresh succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing session");
                self.store.clear().await;
                Err(e)
            }
        }
    }

    /// Return a currently valid access token, refreshing at most once.
    ///
    /// A refresh failure here is swallowed and surfaced as `None`:
    /// "interactive re-authorization needed" is an expected condition, not
    /// an error the caller should crash on.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        if let Some(token) = self.store.access_token().await {
            return Some(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another waiter may have refreshed while this one queued
        if let Some(token) = self.store.access_token().await {
            return Some(token);
        }

        match self.refresh(None).await {
            Ok(()) => self.store.access_token().await,
            Err(e) => {
                warn!(error = %e, "refresh failed, interactive authorization required");
                None
            }
        }
    }

    /// Drop the credential.
    pub async fn logout(&self) {
        self.store.clear().await;
        info!("logged out, credential cleared");
    }
}

/// Map a token-endpoint response into a record, applying defaults.
fn record_from_response(
    response: TokenResponse,
    fallback_refresh: Option<String>,
) -> Result<TokenRecord> {
    let refresh_token = response
        .refresh_token
        .or(fallback_refresh)
        .ok_or_else(|| Error::InvalidRecord("token response carried no refresh token".into()))?;
    let expires_in = response.expires_in.unwrap_or(token::DEFAULT_EXPIRES_IN);
    Ok(TokenRecord {
        access_token: response.access_token,
        refresh_token,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".into()),
        scope: response.scope,
        expires_at: store::now_millis() + expires_in * 1000,
    })
}
