//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. Secrets never
//! live in the TOML itself: the OAuth client secret comes from the
//! RELAY_CLIENT_SECRET env var or `client_secret_file`, and the token
//! store encryption secret from RELAY_TOKEN_KEY or `encryption_key_file`,
//! env winning in both cases.

use crate::error::{Error, Result};
use crate::secret::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Env var supplying the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "RELAY_CLIENT_SECRET";

/// Env var supplying the token store encryption secret.
pub const TOKEN_KEY_ENV: &str = "RELAY_TOKEN_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub store: StoreConfig,
}

/// OAuth client settings for the remote service
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
    /// Path to a file containing the client secret (alternative to the env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Scopes joined with spaces, the form the wire protocol expects.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Token store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(skip)]
    pub encryption_key: Option<SecretString>,
    /// Path to a file containing the encryption secret (alternative to the env var).
    /// When neither is supplied the store generates a per-process key and
    /// cached tokens do not survive a restart.
    #[serde(default)]
    pub encryption_key_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order (per secret): env var, then configured file.
    /// The client secret is required; the encryption secret is optional.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.oauth.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }
        for (name, url) in [
            ("authorize_url", &config.oauth.authorize_url),
            ("token_url", &config.oauth.token_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }
        if config.oauth.scopes.is_empty() {
            return Err(Error::Config("scopes must not be empty".into()));
        }
        if config.http.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        if config.http.max_retries == 0 {
            return Err(Error::Config("max_retries must be greater than 0".into()));
        }

        config.oauth.client_secret = resolve_secret(
            CLIENT_SECRET_ENV,
            config.oauth.client_secret_file.as_deref(),
        )?;
        if config.oauth.client_secret.is_none() {
            return Err(Error::Config(format!(
                "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        }

        config.store.encryption_key = resolve_secret(
            TOKEN_KEY_ENV,
            config.store.encryption_key_file.as_deref(),
        )?;

        Ok(config)
    }
}

/// Resolve a secret from an env var or a file path, env taking precedence.
/// Whitespace-only values are treated as absent.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> Result<Option<SecretString>> {
    if let Ok(value) = std::env::var(env_var) {
        let secret = SecretString::new(value.trim());
        if !secret.is_blank() {
            return Ok(Some(secret));
        }
    }
    if let Some(path) = file {
        let value = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read secret file {}: {e}", path.display()))
        })?;
        let secret = SecretString::new(value.trim());
        if !secret.is_blank() {
            return Ok(Some(secret));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[oauth]
client_id = "relay-client-1"
authorize_url = "https://id.example.com/oauth/authorize"
token_url = "https://id.example.com/oauth/token"
redirect_uri = "https://app.example.com/oauth/callback"
scopes = ["records:read", "records:write"]

[store]
path = "/var/lib/relay/tokens.json"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_valid_config_with_env_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env(CLIENT_SECRET_ENV, "cs_from_env") };
        unsafe { remove_env(TOKEN_KEY_ENV) };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.oauth.client_id, "relay-client-1");
        assert_eq!(config.oauth.scope_string(), "records:read records:write");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(
            config.oauth.client_secret.as_ref().unwrap().expose(),
            "cs_from_env"
        );
        assert!(config.store.encryption_key.is_none());

        unsafe { remove_env(CLIENT_SECRET_ENV) };
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/relay.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_client_secret_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { remove_env(CLIENT_SECRET_ENV) };
        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("client secret missing"),
            "got: {err}"
        );
    }

    #[test]
    fn client_secret_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "cs_from_file\n").unwrap();

        let toml = format!(
            r#"
[oauth]
client_id = "relay-client-1"
client_secret_file = "{}"
authorize_url = "https://id.example.com/oauth/authorize"
token_url = "https://id.example.com/oauth/token"
redirect_uri = "https://app.example.com/oauth/callback"
scopes = ["records:read"]

[store]
path = "/var/lib/relay/tokens.json"
"#,
            secret_path.display()
        );
        let path = write_config(&dir, &toml);

        unsafe { remove_env(CLIENT_SECRET_ENV) };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.oauth.client_secret.as_ref().unwrap().expose(),
            "cs_from_file"
        );
    }

    #[test]
    fn env_secret_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "cs_from_file").unwrap();

        let toml = format!(
            r#"
[oauth]
client_id = "relay-client-1"
client_secret_file = "{}"
authorize_url = "https://id.example.com/oauth/authorize"
token_url = "https://id.example.com/oauth/token"
redirect_uri = "https://app.example.com/oauth/callback"
scopes = ["records:read"]

[store]
path = "/var/lib/relay/tokens.json"
"#,
            secret_path.display()
        );
        let path = write_config(&dir, &toml);

        unsafe { set_env(CLIENT_SECRET_ENV, "cs_env_wins") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.oauth.client_secret.as_ref().unwrap().expose(),
            "cs_env_wins"
        );
        unsafe { remove_env(CLIENT_SECRET_ENV) };
    }

    #[test]
    fn whitespace_only_key_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("token_key");
        std::fs::write(&key_path, "  \n  ").unwrap();

        let toml = format!(
            r#"
[oauth]
client_id = "relay-client-1"
authorize_url = "https://id.example.com/oauth/authorize"
token_url = "https://id.example.com/oauth/token"
redirect_uri = "https://app.example.com/oauth/callback"
scopes = ["records:read"]

[store]
path = "/var/lib/relay/tokens.json"
encryption_key_file = "{}"
"#,
            key_path.display()
        );
        let path = write_config(&dir, &toml);

        unsafe { set_env(CLIENT_SECRET_ENV, "cs") };
        unsafe { remove_env(TOKEN_KEY_ENV) };
        let config = Config::load(&path).unwrap();
        assert!(
            config.store.encryption_key.is_none(),
            "whitespace-only encryption_key_file should result in no key"
        );
        unsafe { remove_env(CLIENT_SECRET_ENV) };
    }

    #[test]
    fn invalid_token_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = valid_toml().replace(
            "https://id.example.com/oauth/token",
            "id.example.com/oauth/token",
        );
        let path = write_config(&dir, &toml);

        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("token_url must start with http"),
            "got: {err}"
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = format!("{}\n[http]\ntimeout_secs = 0\n", valid_toml());
        let path = write_config(&dir, &toml);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn zero_max_retries_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = format!("{}\n[http]\nmax_retries = 0\n", valid_toml());
        let path = write_config(&dir, &toml);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn empty_scopes_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = valid_toml().replace(r#"["records:read", "records:write"]"#, "[]");
        let path = write_config(&dir, &toml);
        assert!(Config::load(&path).is_err());
    }
}
