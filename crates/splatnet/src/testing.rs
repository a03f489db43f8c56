//! Test doubles: a scripted bundle source, recording ports and an axum
//! server standing in for SplatNet, coral and the oracle.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::Secret;
use nso_auth::{Bundle, Endpoints, NsoAuth, VersionCache, VersionOverrides};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::Error;
use crate::ports::{PortFuture, SessionExpiryHandler, TokenSink};
use crate::refresh::BundleSource;

/// Bundle numbered `n`: tokens `g-{n}`, `bullet-{n}` and `coral-{n}`.
pub fn bundle(n: usize) -> Bundle {
    let mut bundle = Bundle::without_session(format!("g-{n}"), format!("bullet-{n}"))
        .with_session_token("st");
    bundle.access_token = Secret::new(format!("coral-{n}"));
    bundle
}

pub fn session() -> Secret<String> {
    Secret::new("st".to_string())
}

/// Scripted bundle source. Unscripted calls succeed with `bundle(n)` where
/// `n` counts calls from 1.
pub struct FakeSource {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<nso_auth::Result<Bundle>>>,
}

impl FakeSource {
    pub fn new(delay: Duration) -> Arc<Self> {
        Self::scripted(delay, Vec::new())
    }

    pub fn scripted(delay: Duration, script: Vec<nso_auth::Result<Bundle>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            script: Mutex::new(script.into()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BundleSource for FakeSource {
    fn derive<'a>(
        &'a self,
        _session_token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = nso_auth::Result<Bundle>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let scripted = self.script.lock().pop_front();
            scripted.unwrap_or_else(|| Ok(bundle(n)))
        })
    }
}

/// Sink that remembers every bundle it was handed.
#[derive(Default)]
pub struct RecordingSink {
    pub bundles: Mutex<Vec<Bundle>>,
    pub fail: bool,
}

impl TokenSink for RecordingSink {
    fn tokens_updated<'a>(&'a self, bundle: &'a Bundle) -> PortFuture<'a> {
        Box::pin(async move {
            self.bundles.lock().push(bundle.clone());
            if self.fail {
                return Err("disk full".into());
            }
            Ok(())
        })
    }
}

/// Expiry handler that remembers the error labels it saw.
#[derive(Default)]
pub struct RecordingExpiry {
    pub seen: Mutex<Vec<&'static str>>,
}

impl SessionExpiryHandler for RecordingExpiry {
    fn session_expired<'a>(&'a self, error: &'a Error) -> PortFuture<'a> {
        Box::pin(async move {
            self.seen.lock().push(error.label());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct Hits {
    pub graphql: AtomicUsize,
    pub app: AtomicUsize,
    pub encrypt: AtomicUsize,
    pub decrypt: AtomicUsize,
}

struct MockState {
    hits: Arc<Hits>,
    statuses: Mutex<VecDeque<u16>>,
    delay: Duration,
    garbage: bool,
    last_body: Mutex<Option<Value>>,
}

type Shared = Arc<MockState>;

/// Running mock server.
pub struct MockSplatNet {
    pub base: String,
    pub hits: Arc<Hits>,
    state: Shared,
}

impl MockSplatNet {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_base(&self.base)
    }

    /// NsoAuth pointed at this server with offline version resolution.
    pub fn auth(&self) -> Arc<NsoAuth> {
        Arc::new(NsoAuth::with_endpoints(
            reqwest::Client::new(),
            self.endpoints(),
            Arc::new(VersionCache::offline(VersionOverrides::default())),
        ))
    }

    pub fn graphql_hits(&self) -> usize {
        self.hits.graphql.load(Ordering::SeqCst)
    }

    pub fn last_graphql_body(&self) -> Option<Value> {
        self.state.last_body.lock().clone()
    }
}

/// Options for [`spawn_splatnet`].
#[derive(Default)]
pub struct MockOptions {
    /// Status for each successive GraphQL call; 200 once exhausted
    pub statuses: Vec<u16>,
    /// Added latency on every GraphQL call
    pub delay: Duration,
    /// Answer 200 with a non-JSON body
    pub garbage: bool,
}

pub async fn spawn_splatnet(options: MockOptions) -> MockSplatNet {
    let hits = Arc::new(Hits::default());
    let state = Arc::new(MockState {
        hits: hits.clone(),
        statuses: Mutex::new(options.statuses.into()),
        delay: options.delay,
        garbage: options.garbage,
        last_body: Mutex::new(None),
    });

    let app = Router::new()
        .route("/api/graphql", post(graphql))
        .route("/api/oauth/token", post(oracle_token))
        .route("/encrypt-request", post(oracle_encrypt))
        .route("/decrypt-response", post(oracle_decrypt))
        .route("/v4/Friend/List", post(friend_list))
        .route("/v4/User/ShowSelf", post(show_self))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSplatNet {
        base: format!("http://{addr}"),
        hits,
        state,
    }
}

/// Echoes the bearer token so tests can tell which bundle was used.
async fn graphql(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hits.graphql.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock() = Some(body);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let status = state.statuses.lock().pop_front().unwrap_or(200);
    let status = StatusCode::from_u16(status).unwrap();
    if !status.is_success() {
        return (status, "denied").into_response();
    }
    if state.garbage {
        return (StatusCode::OK, "<html>maintenance</html>").into_response();
    }

    let echo = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    Json(json!({
        "data": {
            "authorization": echo(header::AUTHORIZATION),
            "cookie": echo(header::COOKIE),
            "vsResult": { "id": "VsResult-1" },
        }
    }))
    .into_response()
}

async fn oracle_token() -> Json<Value> {
    Json(json!({ "access_token": "oracle-1" }))
}

async fn oracle_encrypt(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    use base64::Engine;
    state.hits.encrypt.fetch_add(1, Ordering::SeqCst);
    let plain = body["data"].as_str().unwrap_or_default();
    Json(json!({ "data": base64::engine::general_purpose::STANDARD.encode(plain) }))
}

async fn oracle_decrypt(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    use base64::Engine;
    state.hits.decrypt.fetch_add(1, Ordering::SeqCst);
    let encoded = body["data"].as_str().unwrap_or_default();
    let raw = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    Json(json!({ "data": String::from_utf8(raw).unwrap() }))
}

async fn friend_list(State(state): State<Shared>, headers: HeaderMap, _body: Bytes) -> Response {
    state.hits.app.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    json!({ "status": 0, "result": { "friends": [{ "name": "Callie" }] } })
        .to_string()
        .into_response()
}

async fn show_self(State(state): State<Shared>, _body: Bytes) -> Vec<u8> {
    state.hits.app.fetch_add(1, Ordering::SeqCst);
    json!({ "status": 0, "result": { "name": "Inkling" } })
        .to_string()
        .into_bytes()
}
