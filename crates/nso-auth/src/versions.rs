//! Version strings sent in NSO request headers
//!
//! Three values are needed: the NSO app version (`X-znca-Version`,
//! `X-ProductVersion`), the SplatNet web view version (`X-Web-View-Ver`) and
//! the oracle client version (`X-znca-Client-Version`). Each resolves, in
//! order, from the cache, an override, remote discovery and finally a
//! hardcoded fallback. The resolved value is cached until `reset()`.

use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::constants::{
    APP_VERSION_ENV, APP_VERSION_FALLBACK, CLIENT_VERSION_ENV, CLIENT_VERSION_FALLBACK,
    ORACLE_USER_AGENT, WEB_VIEW_VERSION_ENV, WEB_VIEW_VERSION_FALLBACK,
};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Operator-supplied version values that skip discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionOverrides {
    pub app: Option<String>,
    pub web_view: Option<String>,
    pub client: Option<String>,
}

impl VersionOverrides {
    /// Read `SPLATOON3_NSOAPP_VERSION`, `SPLATOON3_WEB_VIEW_VERSION` and
    /// `SPLATOON3_ZNCA_CLIENT_VERSION`. Empty values are ignored.
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            app: read(APP_VERSION_ENV),
            web_view: read(WEB_VIEW_VERSION_ENV),
            client: read(CLIENT_VERSION_ENV),
        }
    }
}

/// Lazily resolved, explicitly resettable version cache.
///
/// Shared by reference between the oracle client and the API facade so a
/// client version handed out by the oracle is seen by every later request.
pub struct VersionCache {
    http: reqwest::Client,
    discovery_url: Option<String>,
    overrides: VersionOverrides,
    app: RwLock<Option<String>>,
    web_view: RwLock<Option<String>>,
    client: RwLock<Option<String>>,
}

impl VersionCache {
    /// Cache that discovers versions from the oracle's `/config` document.
    pub fn new(
        http: reqwest::Client,
        discovery_url: impl Into<String>,
        overrides: VersionOverrides,
    ) -> Self {
        Self {
            http,
            discovery_url: Some(discovery_url.into()),
            overrides,
            app: RwLock::new(None),
            web_view: RwLock::new(None),
            client: RwLock::new(None),
        }
    }

    /// Cache without remote discovery: overrides, then fallbacks.
    pub fn offline(overrides: VersionOverrides) -> Self {
        Self {
            http: reqwest::Client::new(),
            discovery_url: None,
            overrides,
            app: RwLock::new(None),
            web_view: RwLock::new(None),
            client: RwLock::new(None),
        }
    }

    /// NSO app version.
    pub async fn app_version(&self) -> String {
        if let Some(cached) = self.app.read().clone() {
            return cached;
        }
        let resolved = match &self.overrides.app {
            Some(v) => v.clone(),
            None => self
                .discover("nso_version")
                .await
                .unwrap_or_else(|| fallback("app", APP_VERSION_FALLBACK)),
        };
        self.app.write().get_or_insert(resolved).clone()
    }

    /// SplatNet web view version.
    pub async fn web_view_version(&self) -> String {
        if let Some(cached) = self.web_view.read().clone() {
            return cached;
        }
        let resolved = match &self.overrides.web_view {
            Some(v) => v.clone(),
            None => self
                .discover("web_view_version")
                .await
                .unwrap_or_else(|| fallback("web_view", WEB_VIEW_VERSION_FALLBACK)),
        };
        self.web_view.write().get_or_insert(resolved).clone()
    }

    /// Oracle client version. Discovery for this value happens when the
    /// oracle client authenticates and calls [`set_client_version`].
    ///
    /// [`set_client_version`]: VersionCache::set_client_version
    pub fn client_version(&self) -> String {
        if let Some(cached) = self.client.read().clone() {
            return cached;
        }
        // Not cached: a later oracle authentication may still supply one.
        self.overrides
            .client
            .clone()
            .unwrap_or_else(|| CLIENT_VERSION_FALLBACK.to_string())
    }

    /// Record a client version handed out by the oracle.
    pub fn set_client_version(&self, version: impl Into<String>) {
        let version = version.into();
        debug!(client_version = %version, "oracle issued client version");
        *self.client.write() = Some(version);
    }

    /// Forget all three values so the next read resolves them again.
    pub fn reset(&self) {
        *self.app.write() = None;
        *self.web_view.write() = None;
        *self.client.write() = None;
    }

    async fn discover(&self, field: &str) -> Option<String> {
        let url = self.discovery_url.as_deref()?;
        let response = match self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, ORACLE_USER_AGENT)
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(field, status = %r.status(), "version discovery returned non-success status");
                return None;
            }
            Err(e) => {
                warn!(field, error = %e, "version discovery request failed");
                return None;
            }
        };
        let document: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(field, error = %e, "version discovery returned invalid JSON");
                return None;
            }
        };
        let found = document
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        if found.is_none() {
            debug!(field, "version discovery document has no value");
        }
        found
    }
}

fn fallback(name: &str, value: &str) -> String {
    warn!(version = name, fallback = value, "using hardcoded fallback version");
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::testing::{Scenario, spawn_platform};

    #[tokio::test]
    async fn offline_cache_uses_fallbacks() {
        let cache = VersionCache::offline(VersionOverrides::default());
        assert_eq!(cache.app_version().await, APP_VERSION_FALLBACK);
        assert_eq!(cache.web_view_version().await, WEB_VIEW_VERSION_FALLBACK);
        assert_eq!(cache.client_version(), CLIENT_VERSION_FALLBACK);
    }

    #[tokio::test]
    async fn overrides_win_over_discovery() {
        let platform = spawn_platform(Scenario::default()).await;
        let cache = VersionCache::new(
            reqwest::Client::new(),
            platform.endpoints().oracle_config(),
            VersionOverrides {
                app: Some("4.0.0".into()),
                web_view: Some("11.0.0-abc".into()),
                client: Some("client-x".into()),
            },
        );
        assert_eq!(cache.app_version().await, "4.0.0");
        assert_eq!(cache.web_view_version().await, "11.0.0-abc");
        assert_eq!(cache.client_version(), "client-x");
        assert_eq!(platform.hits.config.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discovery_result_is_cached() {
        let platform = spawn_platform(Scenario::default()).await;
        let cache = VersionCache::new(
            reqwest::Client::new(),
            platform.endpoints().oracle_config(),
            VersionOverrides::default(),
        );
        assert_eq!(cache.app_version().await, "9.9.9");
        assert_eq!(cache.app_version().await, "9.9.9");
        assert_eq!(cache.web_view_version().await, "7.0.0-mock");
        assert_eq!(platform.hits.config.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_discovery_falls_back() {
        // Nothing listens on this port once the listener is dropped
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cache = VersionCache::new(
            reqwest::Client::new(),
            format!("http://{addr}/config"),
            VersionOverrides::default(),
        );
        assert_eq!(cache.app_version().await, APP_VERSION_FALLBACK);
    }

    #[tokio::test]
    async fn reset_forgets_cached_values() {
        let cache = VersionCache::offline(VersionOverrides::default());
        cache.set_client_version("issued-1");
        assert_eq!(cache.client_version(), "issued-1");

        cache.reset();
        assert_eq!(cache.client_version(), CLIENT_VERSION_FALLBACK);
    }

    #[tokio::test]
    async fn reset_rediscovers_remote_versions() {
        let platform = spawn_platform(Scenario::default()).await;
        let cache = VersionCache::new(
            reqwest::Client::new(),
            platform.endpoints().oracle_config(),
            VersionOverrides::default(),
        );
        assert_eq!(cache.app_version().await, "9.9.9");
        assert_eq!(cache.web_view_version().await, "7.0.0-mock");
        assert_eq!(platform.hits.config.load(Ordering::SeqCst), 2);

        cache.reset();
        assert_eq!(cache.app_version().await, "9.9.9");
        assert_eq!(cache.web_view_version().await, "7.0.0-mock");
        assert_eq!(platform.hits.config.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn issued_client_version_beats_override() {
        let cache = VersionCache::offline(VersionOverrides {
            client: Some("from-env".into()),
            ..Default::default()
        });
        assert_eq!(cache.client_version(), "from-env");
        cache.set_client_version("from-oracle");
        assert_eq!(cache.client_version(), "from-oracle");
    }
}
