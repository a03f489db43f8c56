//! File-backed bundle storage
//!
//! Manages a JSON file mapping account IDs to credential bundles. All writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio Mutex
//! serializes concurrent writes from login and refresh persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::error::{Error, Result};

/// One account's stored bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub bundle: Bundle,
    /// Set when a refresh found the session token dead; cleared by the next
    /// login for the account.
    #[serde(default)]
    pub session_expired: bool,
    /// Unix milliseconds of the last write
    pub updated_at: u64,
}

/// Thread-safe bundle file manager.
pub struct BundleStore {
    path: PathBuf,
    state: Mutex<HashMap<String, StoredAccount>>,
}

impl BundleStore {
    /// Load bundles from the given file path.
    ///
    /// A missing file is created as `{}`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading bundle file: {e}")))?;
            let accounts: HashMap<String, StoredAccount> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing bundle file: {e}")))?;
            info!(path = %path.display(), accounts = accounts.len(), "loaded bundles");
            accounts
        } else {
            info!(path = %path.display(), "bundle file not found, starting with empty store");
            let store = HashMap::new();
            write_atomic(&path, &store).await?;
            store
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn get(&self, account_id: &str) -> Option<StoredAccount> {
        let state = self.state.lock().await;
        state.get(account_id).cloned()
    }

    pub async fn account_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }

    /// Store a fresh bundle for an account and persist to disk.
    ///
    /// Clears any earlier session-expired mark.
    pub async fn put(&self, account_id: &str, bundle: Bundle) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(
            account_id.to_string(),
            StoredAccount {
                bundle,
                session_expired: false,
                updated_at: now_millis(),
            },
        );
        debug!(account_id, "stored bundle");
        write_atomic(&self.path, &state).await
    }

    /// Flag an account whose session token was rejected.
    pub async fn mark_session_expired(&self, account_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let account = state
            .get_mut(account_id)
            .ok_or_else(|| Error::NotFound(format!("account {account_id} not in bundle store")))?;
        account.session_expired = true;
        account.updated_at = now_millis();
        info!(account_id, "session marked expired");
        write_atomic(&self.path, &state).await
    }

    /// Remove an account and persist to disk.
    pub async fn remove(&self, account_id: &str) -> Result<Option<StoredAccount>> {
        let mut state = self.state.lock().await;
        let removed = state.remove(account_id);
        if removed.is_some() {
            debug!(account_id, "removed bundle");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write the store atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &HashMap<String, StoredAccount>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing bundles: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("bundle path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".bundles.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp bundle file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting bundle file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp bundle file: {e}")))?;

    debug!(path = %path.display(), "persisted bundles");
    Ok(())
}
