//! SplatNet 3 API facade
//!
//! Every GraphQL operation goes through the request coordinator, so
//! identical concurrent calls share one network round trip. A 401 triggers
//! a single-flight refresh and exactly one retry:
//!
//! 1. Send the query. Success returns `Some(data)`.
//! 2. On 401 with no session token, return `None`; nothing can be refreshed.
//! 3. Otherwise refresh. The cycle leader hands the new bundle to the
//!    [`TokenSink`], or on session expiry / lapsed membership tells the
//!    [`SessionExpiryHandler`], then the error is raised.
//! 4. Retry once. A second 401 returns `None`.
//!
//! Port callbacks run after every lock is released; their failures are
//! logged and never change the result.

use std::sync::Arc;

use common::Secret;
use nso_auth::constants::APP_USER_AGENT;
use nso_auth::{Bundle, NsoAuth};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::dedup::{RequestCoordinator, RequestKey};
use crate::error::{Error, Result};
use crate::graphql::{self, variable};
use crate::metrics;
use crate::ports::{SessionExpiryHandler, TokenSink};
use crate::refresh::{BundleSource, RefreshCoordinator};

/// Default region for [`SplatNet::x_ranking`].
pub const DEFAULT_X_RANKING_REGION: &str = "ATLANTIC";

/// Raw outcome of one GraphQL round trip.
#[derive(Debug, Clone)]
enum Reply {
    Data(Value),
    Unauthorized,
}

/// Client for SplatNet 3 and the NSO app API on behalf of one account.
pub struct SplatNet {
    auth: Arc<NsoAuth>,
    refresh: RefreshCoordinator,
    queries: RequestCoordinator<Reply>,
    app_calls: RequestCoordinator<Value>,
    sink: Option<Arc<dyn TokenSink>>,
    expiry: Option<Arc<dyn SessionExpiryHandler>>,
}

impl SplatNet {
    /// Facade that refreshes through `auth`'s exchange chain.
    pub fn new(auth: Arc<NsoAuth>, bundle: Bundle) -> Self {
        let source: Arc<dyn BundleSource> = auth.clone();
        Self::with_source(auth, source, bundle)
    }

    /// Facade with a custom refresh source. `auth` still supplies the HTTP
    /// client, endpoints, versions and the oracle envelope.
    pub fn with_source(auth: Arc<NsoAuth>, source: Arc<dyn BundleSource>, bundle: Bundle) -> Self {
        Self {
            auth,
            refresh: RefreshCoordinator::new(source, bundle),
            queries: RequestCoordinator::new(),
            app_calls: RequestCoordinator::new(),
            sink: None,
            expiry: None,
        }
    }

    pub fn with_token_sink(mut self, sink: Arc<dyn TokenSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_expiry_handler(mut self, handler: Arc<dyn SessionExpiryHandler>) -> Self {
        self.expiry = Some(handler);
        self
    }

    /// Snapshot of the bundle requests are currently sent with.
    pub fn bundle(&self) -> Bundle {
        self.refresh.current()
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Refresh now, regardless of token state.
    pub async fn refresh(&self) -> Result<Bundle> {
        let token = self.session_token().ok_or(Error::NoSession)?;
        self.refresh_tokens(&token).await
    }

    /// Run any persisted query by name.
    pub async fn query(&self, operation: &str, variables: Map<String, Value>) -> Result<Option<Value>> {
        let body = graphql::request_body(operation, variables)?;
        let key = RequestKey::new(operation, &body["variables"]);

        if let Reply::Data(data) = self.send_query(key.clone(), operation, &body).await? {
            return Ok(Some(data));
        }

        let Some(token) = self.session_token() else {
            warn!(operation, "401 from SplatNet and no session token to refresh with");
            return Ok(None);
        };

        info!(operation, "401 from SplatNet, refreshing tokens");
        self.refresh_tokens(&token).await?;
        metrics::record_auth_retry();

        match self.send_query(key.retry(), operation, &body).await? {
            Reply::Data(data) => Ok(Some(data)),
            Reply::Unauthorized => {
                warn!(operation, "still unauthorized after refresh");
                Ok(None)
            }
        }
    }

    pub async fn home(&self) -> Result<Option<Value>> {
        let country = self.refresh.current().user_country;
        self.query(graphql::HOME, variable("naCountry", country)).await
    }

    pub async fn recent_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::LATEST_BATTLES, Map::new()).await
    }

    pub async fn regular_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::REGULAR_BATTLES, Map::new()).await
    }

    pub async fn bankara_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::BANKARA_BATTLES, Map::new()).await
    }

    pub async fn x_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::X_BATTLES, Map::new()).await
    }

    pub async fn event_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::EVENT_BATTLES, Map::new()).await
    }

    pub async fn private_battles(&self) -> Result<Option<Value>> {
        self.query(graphql::PRIVATE_BATTLES, Map::new()).await
    }

    pub async fn battle_detail(&self, battle_id: &str) -> Result<Option<Value>> {
        self.query(graphql::BATTLE_DETAIL, variable("vsResultId", battle_id))
            .await
    }

    /// ID of the most recent battle, if SplatNet reports one.
    pub async fn latest_battle_id(&self) -> Result<Option<String>> {
        let data = self.query(graphql::LATEST_BATTLE, Map::new()).await?;
        Ok(data.and_then(|d| {
            d.pointer("/data/vsResult/id")
                .and_then(Value::as_str)
                .map(str::to_owned)
        }))
    }

    pub async fn coops(&self) -> Result<Option<Value>> {
        self.query(graphql::COOPS, Map::new()).await
    }

    pub async fn coop_detail(&self, coop_id: &str) -> Result<Option<Value>> {
        self.query(graphql::COOP_DETAIL, variable("coopHistoryDetailId", coop_id))
            .await
    }

    pub async fn x_ranking(&self, region: &str) -> Result<Option<Value>> {
        self.query(graphql::X_RANKING, variable("region", region)).await
    }

    pub async fn history_summary(&self) -> Result<Option<Value>> {
        self.query(graphql::HISTORY_RECORD, Map::new()).await
    }

    pub async fn friends(&self) -> Result<Option<Value>> {
        self.query(graphql::FRIENDS, Map::new()).await
    }

    pub async fn weapon_records(&self) -> Result<Option<Value>> {
        self.query(graphql::WEAPON_RECORDS, Map::new()).await
    }

    pub async fn stage_records(&self) -> Result<Option<Value>> {
        self.query(graphql::STAGE_RECORDS, Map::new()).await
    }

    pub async fn schedules(&self) -> Result<Option<Value>> {
        self.query(graphql::SCHEDULES, Map::new()).await
    }

    /// NSO app friend list.
    pub async fn app_friend_list(&self) -> Result<Value> {
        self.app_call("FriendList", &self.auth.endpoints().coral_friend_list())
            .await
    }

    /// NSO app profile of the logged-in user.
    pub async fn app_myself(&self) -> Result<Value> {
        self.app_call("ShowSelf", &self.auth.endpoints().coral_show_self())
            .await
    }

    /// Whether the home query answers. Refreshes if needed; session expiry
    /// and lapsed membership are raised, other failures count as `false`.
    pub async fn test_connection(&self) -> Result<bool> {
        match self.home().await {
            Ok(data) => Ok(data.is_some()),
            Err(e) if e.requires_relogin() => Err(e),
            Err(e) => {
                warn!(error = %e, "connection test failed");
                Ok(false)
            }
        }
    }

    fn session_token(&self) -> Option<Secret<String>> {
        let bundle = self.refresh.current();
        if bundle.can_refresh() {
            bundle.session_token
        } else {
            None
        }
    }

    async fn refresh_tokens(&self, token: &Secret<String>) -> Result<Bundle> {
        let attempt = self.refresh.attempt(token).await;
        if attempt.led {
            match &attempt.outcome {
                Ok(bundle) => self.notify_tokens_updated(bundle).await,
                Err(e) if e.requires_relogin() => self.notify_session_expired(e).await,
                Err(_) => {}
            }
        }
        attempt.outcome
    }

    async fn notify_tokens_updated(&self, bundle: &Bundle) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.tokens_updated(bundle).await {
                error!(error = %e, "token sink failed, refreshed bundle not persisted");
            }
        }
    }

    async fn notify_session_expired(&self, cause: &Error) {
        if let Some(handler) = &self.expiry {
            if let Err(e) = handler.session_expired(cause).await {
                error!(error = %e, cause = %cause, "session expiry handler failed");
            }
        }
    }

    async fn send_query(&self, key: RequestKey, operation: &str, body: &Value) -> Result<Reply> {
        self.queries
            .run(key, || self.post_query(operation, body))
            .await
    }

    async fn post_query(&self, operation: &str, body: &Value) -> Result<Reply> {
        let bundle = self.refresh.current();
        let splatnet = &self.auth.endpoints().splatnet;
        let lang = &bundle.user_lang;
        let country = &bundle.user_country;
        let web_view = self.auth.versions().web_view_version().await;

        let response = self
            .auth
            .http()
            .post(self.auth.endpoints().graphql())
            .bearer_auth(bundle.bullet_token.expose())
            .header(reqwest::header::ACCEPT_LANGUAGE, lang)
            .header(reqwest::header::USER_AGENT, APP_USER_AGENT)
            .header("X-Web-View-Ver", web_view)
            .header(reqwest::header::ACCEPT, "*/*")
            .header(reqwest::header::ORIGIN, splatnet)
            .header("X-Requested-With", "com.nintendo.znca")
            .header(
                reqwest::header::REFERER,
                format!("{splatnet}/?lang={lang}&na_country={country}&na_lang={lang}"),
            )
            .header(
                reqwest::header::COOKIE,
                format!("_gtoken={}", bundle.g_token.expose()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            debug!(operation, "SplatNet answered 401");
            return Ok(Reply::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Transport(format!(
                "{operation} returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Value>()
            .await
            .map(Reply::Data)
            .map_err(|e| Error::Transport(format!("{operation} returned invalid JSON: {e}")))
    }

    async fn app_call(&self, operation: &str, url: &str) -> Result<Value> {
        let key = RequestKey::new(operation, &Value::Null);
        self.app_calls.run(key, || self.post_app(url)).await
    }

    /// App API call through the oracle encrypt/decrypt envelope.
    async fn post_app(&self, url: &str) -> Result<Value> {
        let bundle = self.refresh.current();
        let access_token = bundle.access_token.expose();
        let oracle = self.auth.oracle();
        let encrypted = oracle
            .encrypt_request(url, access_token, &json!({ "parameter": {} }))
            .await?;
        let versions = self.auth.versions();
        let app_version = versions.app_version().await;

        let response = self
            .auth
            .http()
            .post(url)
            .bearer_auth(access_token)
            .header("X-Platform", "Android")
            .header("X-ProductVersion", &app_version)
            .header("X-znca-Client-Version", versions.client_version())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(
                reqwest::header::ACCEPT,
                "application/octet-stream, application/json",
            )
            .header(
                reqwest::header::USER_AGENT,
                format!("com.nintendo.znca/{app_version}(Android/14)"),
            )
            .body(encrypted)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("app request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("app request to {url} returned {status}")));
        }
        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading app response from {url}: {e}")))?;

        let plain = oracle.decrypt_response(&raw).await?;
        serde_json::from_str(&plain)
            .map_err(|e| Error::Transport(format!("app response from {url} is not JSON: {e}")))
    }
}
