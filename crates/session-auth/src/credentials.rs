//! Credential storage for the session's token pair
//!
//! A client holds exactly one `CredentialPair` at a time. It is created on
//! login, replaced wholesale after a successful refresh, and wiped when the
//! session ends. Readers always get a clone, never a reference into the store,
//! so a pair observed by one request can't change underneath it.
//!
//! Two stores are provided: `MemoryCredentialStore` for process-local sessions
//! and tests, and `FileCredentialStore`, which survives restarts by keeping the
//! pair in a JSON file written atomically (temp file + rename, mode 0600).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::claims::{Claims, decode_claims};
use crate::error::{Error, Result};

/// Boxed future returned by `CredentialStore` methods, so the trait stays
/// dyn-compatible (`Arc<dyn CredentialStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Access and refresh tokens with their expirations.
///
/// Expirations are absolute unix timestamps in milliseconds; `0` means the
/// issuer did not say. The client never acts on them (the server's 401 is
/// the only expiry signal it trusts), they are kept for display and for
/// carrying forward across refreshes that omit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub access_expires: u64,
    pub refresh_token: Secret<String>,
    #[serde(default)]
    pub refresh_expires: u64,
}

impl CredentialPair {
    pub fn new(
        access_token: impl Into<Secret<String>>,
        access_expires: u64,
        refresh_token: impl Into<Secret<String>>,
        refresh_expires: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            access_expires,
            refresh_token: refresh_token.into(),
            refresh_expires,
        }
    }

    /// Build a pair from raw tokens, reading expirations from their `exp`
    /// claims when they are JWTs. Opaque tokens get an unknown (0) expiry.
    pub fn from_tokens(access_token: String, refresh_token: String) -> Self {
        let access_expires = expiry_from_claims(&access_token);
        let refresh_expires = expiry_from_claims(&refresh_token);
        Self::new(access_token, access_expires, refresh_token, refresh_expires)
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.expose().is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.expose().is_empty()
    }

    /// Whether the access token's recorded expiry has passed. Unknown expiry
    /// is never considered expired.
    pub fn access_expired(&self, now_millis: u64) -> bool {
        self.access_expires != 0 && self.access_expires <= now_millis
    }
}

fn expiry_from_claims(token: &str) -> u64 {
    decode_claims(token)
        .ok()
        .and_then(|claims| claims.expires_at_millis())
        .unwrap_or(0)
}

/// Where the session's credential pair lives.
///
/// Implementations must make `set` and `clear` atomic with respect to `get`:
/// a reader sees either the old pair or the new one, never a mix.
pub trait CredentialStore: Send + Sync {
    /// Clone of the current pair, if any.
    fn get(&self) -> BoxFuture<'_, Option<CredentialPair>>;

    /// Replace the current pair.
    fn set(&self, pair: CredentialPair) -> BoxFuture<'_, Result<()>>;

    /// Remove the current pair. Clearing an empty store is not an error.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;

    /// Decoded claims of the stored access token, if there is one and it is a JWT.
    fn access_claims(&self) -> BoxFuture<'_, Option<Claims>> {
        Box::pin(async move {
            let pair = self.get().await?;
            decode_claims(pair.access_token.expose()).ok()
        })
    }
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> BoxFuture<'_, Option<CredentialPair>> {
        let pair = self
            .pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::pin(async move { pair })
    }

    fn set(&self, pair: CredentialPair) -> BoxFuture<'_, Result<()>> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
        debug!("stored credential pair");
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        self.pair
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("cleared credential pair");
        Box::pin(async { Ok(()) })
    }
}

/// Credential store persisted to a JSON file.
///
/// The Mutex serializes writes. The in-memory pair is updated before the file
/// is written, so a failed write leaves the running process with the new pair
/// and reports the error for the caller to log.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<Option<CredentialPair>>,
}

impl FileCredentialStore {
    /// Load the credential pair from the given file path.
    ///
    /// If the file doesn't exist, creates it as `null` (no session yet). A
    /// file containing `null` is a logged-out session.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let pair: Option<CredentialPair> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), logged_in = pair.is_some(), "loaded credentials");
            pair
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            write_atomic(&path, &None).await?;
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> BoxFuture<'_, Option<CredentialPair>> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, pair: CredentialPair) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = Some(pair);
            debug!("stored credential pair");
            write_atomic(&self.path, &state).await
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.take().is_none() && self.path.exists() {
                return Ok(());
            }
            debug!("cleared credential pair");
            write_atomic(&self.path, &state).await
        })
    }
}

/// Write the credential pair to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, pair: &Option<CredentialPair>) -> Result<()> {
    let json = serde_json::to_string_pretty(pair)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
