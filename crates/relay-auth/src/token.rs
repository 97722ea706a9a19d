//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial OAuth flow completion)
//! 2. Token refresh (proactive and request-time refresh)
//!
//! Both operations POST form-encoded bodies to the configured token
//! endpoint with different grant types.

use common::OAuthConfig;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Lifetime assumed when the token endpoint omits `expires_in`, in seconds.
/// The store applies its own ceiling on top of this.
pub const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// converts it to an absolute unix millisecond timestamp when storing the
/// credential. A response without `access_token` fails deserialization,
/// which is the intended hard failure.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn client_secret(oauth: &OAuthConfig) -> &str {
    oauth
        .client_secret
        .as_ref()
        .map(|s| s.expose())
        .unwrap_or_default()
}

/// Exchange an authorization code for tokens (initial OAuth flow).
///
/// Second step of the PKCE flow: the user has authorized in their browser
/// and the authorization code came back on the redirect. The code is sent
/// along with the PKCE verifier to prove we initiated the flow.
pub async fn exchange_code(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&oauth.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", &oauth.client_id),
            ("client_secret", client_secret(oauth)),
            ("code", code),
            ("redirect_uri", &oauth.redirect_uri),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// Called proactively before expiration and reactively at request time
/// when the cached token is already inside its expiry window.
pub async fn refresh_token(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&oauth.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", &oauth.client_id),
            ("client_secret", client_secret(oauth)),
            ("refresh_token", refresh),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_oauth(token_url: String) -> OAuthConfig {
        OAuthConfig {
            client_id: "relay-client-1".into(),
            client_secret: Some("cs_test".into()),
            client_secret_file: None,
            authorize_url: "https://id.example.com/oauth/authorize".into(),
            token_url,
            redirect_uri: "https://app.example.com/oauth/callback".into(),
            scopes: vec!["records:read".into()],
        }
    }

    #[test]
    fn token_response_deserializes_full() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","expires_in":3600,"token_type":"Bearer","scope":"records:read"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_def"));
        assert_eq!(token.expires_in, Some(3600));
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        assert_eq!(token.scope.as_deref(), Some("records:read"));
    }

    #[test]
    fn token_response_optional_fields_default() {
        let json = r#"{"access_token":"at_abc"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
        assert!(token.token_type.is_none());
        assert!(token.scope.is_none());
    }

    #[test]
    fn missing_access_token_is_hard_failure() {
        let json = r#"{"refresh_token":"rt_def","expires_in":3600}"#;
        let result = serde_json::from_str::<TokenResponse>(json);
        assert!(result.is_err(), "response without access_token must fail");
    }

    #[tokio::test]
    async fn exchange_sends_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_id=relay-client-1"))
            .and(body_string_contains("client_secret=cs_test"))
            .and(body_string_contains("code=auth-code-abc"))
            .and(body_string_contains("code_verifier=verifier-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_new",
                "refresh_token": "rt_new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = test_oauth(format!("{}/oauth/token", server.uri()));
        let client = reqwest::Client::new();
        let token = exchange_code(&client, &oauth, "auth-code-abc", "verifier-xyz")
            .await
            .unwrap();
        assert_eq!(token.access_token, "at_new");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_new"));
    }

    #[tokio::test]
    async fn refresh_sends_refresh_token_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_refreshed",
                "expires_in": 900
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = test_oauth(format!("{}/oauth/token", server.uri()));
        let client = reqwest::Client::new();
        let token = refresh_token(&client, &oauth, "rt_old").await.unwrap();
        assert_eq!(token.access_token, "at_refreshed");
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn exchange_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let oauth = test_oauth(format!("{}/oauth/token", server.uri()));
        let client = reqwest::Client::new();
        let err = exchange_code(&client, &oauth, "bad-code", "verifier")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn refresh_malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let oauth = test_oauth(format!("{}/oauth/token", server.uri()));
        let client = reqwest::Client::new();
        let err = refresh_token(&client, &oauth, "rt_x").await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }
}
