//! Encrypted, TTL-bounded token storage
//!
//! Holds at most one credential record. Both tokens are sealed with
//! AES-256-GCM (fresh nonce per seal, nonce prepended to the ciphertext)
//! before they touch memory-at-rest or disk. All writes use atomic
//! temp-file + rename to prevent corruption on crash, and a tokio Mutex
//! serializes access from request-time and proactive refresh paths.
//!
//! Validity is recomputed from the wall clock on every read. A record
//! whose access token has hard-expired still yields its refresh token:
//! refreshing must remain possible after the access token stops being
//! usable, and a failed refresh clears the record anyway.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::SecretString;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Ceiling on a record's lifetime, regardless of what the server grants.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(1200);

/// How long before hard expiry a record stops counting as valid.
pub const VALIDITY_BUFFER: Duration = Duration::from_secs(300);

const NONCE_LEN: usize = 12;

/// A decrypted credential record.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a
/// delta), computed at storage time and clamped to [`MAX_TOKEN_TTL`].
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: u64,
}

/// On-disk and in-memory form: tokens sealed, metadata plain.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedRecord {
    access: String,
    refresh: String,
    token_type: String,
    scope: Option<String>,
    expires_at: u64,
}

/// Single-record encrypted token store.
pub struct TokenStore {
    path: PathBuf,
    cipher: Aes256Gcm,
    state: Mutex<Option<SealedRecord>>,
}

/// Current wall clock as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl TokenStore {
    /// Open a store backed by the given file path.
    ///
    /// With an external secret the AES-256 key is SHA-256(secret), so
    /// sealed records survive process restarts. Without one a random key
    /// is generated for this process only; a file sealed by a previous
    /// process then fails decryption on first read and is cleared.
    pub async fn open(path: PathBuf, secret: Option<&SecretString>) -> Result<Self> {
        let key_bytes: [u8; 32] = match secret {
            Some(s) => Sha256::digest(s.expose().as_bytes()).into(),
            None => {
                debug!("no encryption secret configured, sealed tokens will not survive restart");
                let mut key = [0u8; 32];
                rand::rng().fill(&mut key);
                key
            }
        };
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));

        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token store: {e}")))?;
            match serde_json::from_str::<Option<SealedRecord>>(&contents) {
                Ok(record) => {
                    info!(path = %path.display(), present = record.is_some(), "loaded token store");
                    record
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "token store unreadable, starting empty");
                    write_atomic(&path, &None).await?;
                    None
                }
            }
        } else {
            info!(path = %path.display(), "token store not found, starting empty");
            write_atomic(&path, &None).await?;
            None
        };

        Ok(Self {
            path,
            cipher,
            state: Mutex::new(state),
        })
    }

    /// Seal and persist a record, replacing any prior one.
    ///
    /// Rejects records with empty token strings or an empty token type.
    /// `expires_at` is clamped so the record never outlives
    /// [`MAX_TOKEN_TTL`] from now.
    pub async fn store(&self, record: TokenRecord) -> Result<()> {
        if record.access_token.trim().is_empty() {
            return Err(Error::InvalidRecord("access token must not be empty".into()));
        }
        if record.refresh_token.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "refresh token must not be empty".into(),
            ));
        }
        if record.token_type.trim().is_empty() {
            return Err(Error::InvalidRecord("token type must not be empty".into()));
        }

        let ceiling = now_millis() + MAX_TOKEN_TTL.as_millis() as u64;
        let sealed = SealedRecord {
            access: self.seal(&record.access_token)?,
            refresh: self.seal(&record.refresh_token)?,
            token_type: record.token_type,
            scope: record.scope,
            expires_at: record.expires_at.min(ceiling),
        };

        let mut state = self.state.lock().await;
        *state = Some(sealed);
        write_atomic(&self.path, &state).await?;
        debug!("stored token record");
        Ok(())
    }

    /// Unseal and return the current record.
    ///
    /// Any decryption failure clears the store and returns `None` rather
    /// than surfacing an error: corrupt credentials are unrecoverable and
    /// must not be partially served.
    pub async fn retrieve(&self) -> Option<TokenRecord> {
        let mut state = self.state.lock().await;
        let sealed = state.as_ref()?.clone();
        match (self.unseal(&sealed.access), self.unseal(&sealed.refresh)) {
            (Some(access_token), Some(refresh_token)) => Some(TokenRecord {
                access_token,
                refresh_token,
                token_type: sealed.token_type,
                scope: sealed.scope,
                expires_at: sealed.expires_at,
            }),
            _ => {
                warn!("token decryption failed, clearing store");
                self.clear_locked(&mut state).await;
                None
            }
        }
    }

    /// Whether a record exists and stays usable past the validity buffer.
    pub async fn is_valid(&self) -> bool {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(sealed) => now_millis() + (VALIDITY_BUFFER.as_millis() as u64) < sealed.expires_at,
            None => false,
        }
    }

    /// Whether the record expires within `window`. No record counts as
    /// already due.
    pub async fn expires_within(&self, window: Duration) -> bool {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(sealed) => now_millis() + window.as_millis() as u64 >= sealed.expires_at,
            None => true,
        }
    }

    /// Decrypted access token, gated by [`Self::is_valid`] semantics.
    pub async fn access_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        let sealed = state.as_ref()?;
        if now_millis() + VALIDITY_BUFFER.as_millis() as u64 >= sealed.expires_at {
            return None;
        }
        let sealed_access = sealed.access.clone();
        match self.unseal(&sealed_access) {
            Some(token) => Some(token),
            None => {
                warn!("access token decryption failed, clearing store");
                self.clear_locked(&mut state).await;
                None
            }
        }
    }

    /// Decrypted refresh token. Deliberately NOT gated by validity: the
    /// refresh path runs exactly when the access token no longer counts.
    pub async fn refresh_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        let sealed_refresh = state.as_ref()?.refresh.clone();
        match self.unseal(&sealed_refresh) {
            Some(token) => Some(token),
            None => {
                warn!("refresh token decryption failed, clearing store");
                self.clear_locked(&mut state).await;
                None
            }
        }
    }

    /// Drop the record and persist the empty state.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        self.clear_locked(&mut state).await;
        debug!("token store cleared");
    }

    async fn clear_locked(&self, state: &mut Option<SealedRecord>) {
        *state = None;
        if let Err(e) = write_atomic(&self.path, state).await {
            warn!(error = %e, "failed to persist cleared token store");
        }
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::Crypto("token encryption failed".into()))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn unseal(&self, sealed: &str) -> Option<String> {
        let blob = BASE64.decode(sealed).ok()?;
        if blob.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// Write the sealed state to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. File permissions are set to 0600 (owner read/write only)
/// since the file contains sealed OAuth tokens.
async fn write_atomic(path: &Path, state: &Option<SealedRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Io(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token store: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token store: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}
