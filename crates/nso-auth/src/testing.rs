//! In-process stand-in for the Nintendo hosts and the oracle.
//!
//! Every service is mounted on one axum router so a single
//! `Endpoints::with_base` points the whole client at it. The oracle's
//! "encryption" is base64 of the plaintext, so coral handlers read and write
//! plain JSON.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::constants::MEMBERSHIP_REQUIRED_MESSAGE;
use crate::endpoints::Endpoints;

/// Failure knobs for one mock run. The default is a fully healthy platform.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    /// OAuth error returned by the identity token endpoint
    pub identity_error: Option<&'static str>,
    /// Number of leading coral logins answered without credentials
    pub login_failures: usize,
    pub membership_lapsed: bool,
    /// Bullet token status; 201 when unset
    pub bullet_status: Option<u16>,
    /// Proofs come back without an encrypted body
    pub omit_encrypted: bool,
    /// Number of leading proof calls answered with `invalid_token`
    pub oracle_invalid_tokens: usize,
    /// Number of leading decrypt calls answered with HTTP 401
    pub oracle_decrypt_unauthorized: usize,
    /// Error code every proof call answers with
    pub oracle_error: Option<&'static str>,
    /// HTTP status every proof call answers with
    pub oracle_status: Option<u16>,
    /// Proof calls answer with a non-JSON body
    pub oracle_garbage: bool,
}

/// Request counters, one per route.
#[derive(Debug, Default)]
pub struct Hits {
    pub oracle_token: AtomicUsize,
    pub proof: AtomicUsize,
    pub decrypt: AtomicUsize,
    pub encrypt: AtomicUsize,
    pub config: AtomicUsize,
    pub session_token: AtomicUsize,
    pub identity: AtomicUsize,
    pub profile: AtomicUsize,
    pub login: AtomicUsize,
    pub game: AtomicUsize,
    pub bullet: AtomicUsize,
}

struct MockState {
    scenario: Scenario,
    hits: Arc<Hits>,
    session_verifier: Mutex<Option<String>>,
    bullet_cookie: Mutex<Option<String>>,
}

type Shared = Arc<MockState>;

/// Handle to a running mock platform.
pub struct MockPlatform {
    pub base: String,
    pub hits: Arc<Hits>,
    state: Shared,
}

impl MockPlatform {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_base(&self.base)
    }

    pub fn last_session_verifier(&self) -> Option<String> {
        self.state.session_verifier.lock().clone()
    }

    pub fn last_bullet_cookie(&self) -> Option<String> {
        self.state.bullet_cookie.lock().clone()
    }
}

pub async fn spawn_platform(scenario: Scenario) -> MockPlatform {
    let hits = Arc::new(Hits::default());
    let state = Arc::new(MockState {
        scenario,
        hits: hits.clone(),
        session_verifier: Mutex::new(None),
        bullet_cookie: Mutex::new(None),
    });

    let app = Router::new()
        .route("/api/oauth/token", post(oracle_token))
        .route("/f", post(oracle_proof))
        .route("/decrypt-response", post(oracle_decrypt))
        .route("/encrypt-request", post(oracle_encrypt))
        .route("/config", get(oracle_config))
        .route("/connect/1.0.0/api/session_token", post(session_token))
        .route("/connect/1.0.0/api/token", post(identity_token))
        .route("/2.0.0/users/me", get(profile))
        .route("/v4/Account/Login", post(coral_login))
        .route("/v4/Game/GetWebServiceToken", post(web_service_token))
        .route("/api/bullet_tokens", post(bullet_tokens))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockPlatform {
        base: format!("http://{addr}"),
        hits,
        state,
    }
}

fn bump(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

async fn oracle_token(State(state): State<Shared>) -> Json<Value> {
    let n = bump(&state.hits.oracle_token);
    Json(json!({
        "access_token": format!("oracle-{n}"),
        "token_type": "Bearer",
        "client_version": "cv-mock",
    }))
}

async fn oracle_proof(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let n = bump(&state.hits.proof);
    let scenario = &state.scenario;

    if n <= scenario.oracle_invalid_tokens {
        return Json(json!({ "error": "invalid_token" })).into_response();
    }
    if let Some(status) = scenario.oracle_status {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, "upstream unavailable").into_response();
    }
    if scenario.oracle_garbage {
        return (StatusCode::OK, "<html>not json</html>").into_response();
    }
    if let Some(error) = scenario.oracle_error {
        return Json(json!({ "error": error, "error_description": "mock" })).into_response();
    }

    let mut answer = json!({
        "f": format!("f-{n}"),
        "request_id": format!("req-{n}"),
        "timestamp": 1_700_000_000_000_i64,
    });
    if !scenario.omit_encrypted {
        let parameter = body
            .pointer("/encrypt_token_request/parameter")
            .cloned()
            .unwrap_or(Value::Null);
        answer["encrypted_token_request"] =
            json!(STANDARD.encode(json!({ "parameter": parameter }).to_string()));
    }
    Json(answer).into_response()
}

async fn oracle_decrypt(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let n = bump(&state.hits.decrypt);
    if n <= state.scenario.oracle_decrypt_unauthorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let encoded = body["data"].as_str().unwrap_or_default();
    let plain = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
    Json(json!({ "data": plain })).into_response()
}

async fn oracle_encrypt(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    bump(&state.hits.encrypt);
    let plain = body["data"].as_str().unwrap_or_default();
    Json(json!({ "data": STANDARD.encode(plain) }))
}

async fn oracle_config(State(state): State<Shared>) -> Json<Value> {
    bump(&state.hits.config);
    Json(json!({
        "nso_version": "9.9.9",
        "web_view_version": "7.0.0-mock",
    }))
}

async fn session_token(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    bump(&state.hits.session_token);
    *state.session_verifier.lock() = form.get("session_token_code_verifier").cloned();
    Json(json!({ "session_token": "st-mock", "code": form.get("session_token_code") }))
}

async fn identity_token(State(state): State<Shared>) -> Response {
    bump(&state.hits.identity);
    if let Some(error) = state.scenario.identity_error {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": error, "error_description": "mock" })),
        )
            .into_response();
    }
    Json(json!({
        "access_token": "id-access",
        "id_token": "id-token",
        "expires_in": 900,
    }))
    .into_response()
}

async fn profile(State(state): State<Shared>) -> Json<Value> {
    bump(&state.hits.profile);
    Json(json!({
        "id": "na-1",
        "nickname": "Inkling",
        "language": "en-US",
        "country": "US",
        "birthday": "1990-01-01",
    }))
}

async fn coral_login(State(state): State<Shared>, _body: Bytes) -> Vec<u8> {
    let n = bump(&state.hits.login);
    let answer = if n <= state.scenario.login_failures {
        json!({ "status": 9403, "errorMessage": "Invalid token." })
    } else {
        json!({
            "status": 0,
            "result": {
                "user": { "id": 123, "name": "Inkling" },
                "webApiServerCredential": { "accessToken": "coral-access", "expiresIn": 7200 }
            }
        })
    };
    answer.to_string().into_bytes()
}

async fn web_service_token(State(state): State<Shared>, _body: Bytes) -> Vec<u8> {
    bump(&state.hits.game);
    let answer = if state.scenario.membership_lapsed {
        json!({ "status": 9450, "errorMessage": MEMBERSHIP_REQUIRED_MESSAGE })
    } else {
        json!({ "status": 0, "result": { "accessToken": "g-token", "expiresIn": 10800 } })
    };
    answer.to_string().into_bytes()
}

async fn bullet_tokens(State(state): State<Shared>, headers: HeaderMap) -> Response {
    bump(&state.hits.bullet);
    *state.bullet_cookie.lock() = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let status = StatusCode::from_u16(state.scenario.bullet_status.unwrap_or(201)).unwrap();
    (status, Json(json!({ "bulletToken": "bullet-1" }))).into_response()
}
