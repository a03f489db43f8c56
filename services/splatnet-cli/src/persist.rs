//! Bundle persistence for the API client's callback ports

use std::sync::Arc;

use nso_auth::{Bundle, BundleStore};
use splatnet::{PortFuture, SessionExpiryHandler, TokenSink};
use tracing::{info, warn};

/// Writes refreshed bundles back to the store and flags dead sessions.
pub struct StoreBinding {
    store: Arc<BundleStore>,
    account: String,
}

impl StoreBinding {
    pub fn new(store: Arc<BundleStore>, account: impl Into<String>) -> Self {
        Self {
            store,
            account: account.into(),
        }
    }
}

impl TokenSink for StoreBinding {
    fn tokens_updated<'a>(&'a self, bundle: &'a Bundle) -> PortFuture<'a> {
        Box::pin(async move {
            self.store.put(&self.account, bundle.clone()).await?;
            info!(account = %self.account, "refreshed bundle persisted");
            Ok(())
        })
    }
}

impl SessionExpiryHandler for StoreBinding {
    fn session_expired<'a>(&'a self, error: &'a splatnet::Error) -> PortFuture<'a> {
        Box::pin(async move {
            warn!(account = %self.account, error = %error, "session no longer usable, login required");
            self.store.mark_session_expired(&self.account).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(bullet: &str) -> Bundle {
        Bundle::without_session("g", bullet).with_session_token("st")
    }

    async fn binding(dir: &tempfile::TempDir) -> (Arc<BundleStore>, StoreBinding) {
        let store = Arc::new(BundleStore::load(dir.path().join("bundles.json")).await.unwrap());
        let binding = StoreBinding::new(store.clone(), "main");
        (store, binding)
    }

    #[tokio::test]
    async fn refreshed_bundle_replaces_stored_one() {
        let dir = tempfile::tempdir().unwrap();
        let (store, binding) = binding(&dir).await;
        store.put("main", bundle("old")).await.unwrap();

        binding.tokens_updated(&bundle("new")).await.unwrap();

        let stored = store.get("main").await.unwrap();
        assert_eq!(stored.bundle.bullet_token.expose(), "new");

        // Survives a reload from disk
        let reloaded = BundleStore::load(dir.path().join("bundles.json")).await.unwrap();
        assert_eq!(
            reloaded.get("main").await.unwrap().bundle.bullet_token.expose(),
            "new"
        );
    }

    #[tokio::test]
    async fn expiry_flags_the_account() {
        let dir = tempfile::tempdir().unwrap();
        let (store, binding) = binding(&dir).await;
        store.put("main", bundle("b")).await.unwrap();

        let cause = splatnet::Error::Auth(nso_auth::Error::SessionExpired);
        binding.session_expired(&cause).await.unwrap();

        assert!(store.get("main").await.unwrap().session_expired);
    }

    #[tokio::test]
    async fn expiry_for_unknown_account_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, binding) = binding(&dir).await;

        let cause = splatnet::Error::Auth(nso_auth::Error::SessionExpired);
        assert!(binding.session_expired(&cause).await.is_err());
    }
}
