//! Credential exchange state machine
//!
//! Login walks a fixed chain of exchanges, each consuming the previous
//! step's output:
//!
//! ```text
//! Init -> AwaitingRedirect -> SessionExchanged -> IdentityExchanged
//!      -> AccessExchanged -> GameTokenExchanged -> Complete
//! ```
//!
//! The browser steps run once per login. A refresh starts from the stored
//! session token and re-runs `IdentityExchanged..Complete` via
//! [`NsoAuth::derive_bundle`].

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::bundle::Bundle;
use crate::constants::{
    APP_USER_AGENT, MEMBERSHIP_REQUIRED_MESSAGE, NSO_CLIENT_ID, SESSION_TOKEN_GRANT_TYPE,
    SPLATNET_WEB_SERVICE_ID,
};
use crate::endpoints::Endpoints;
use crate::error::{Error, IssuanceFailure, Result, excerpt};
use crate::oracle::{EncryptTokenRequest, OracleClient, ProofRequest, ProofStep};
use crate::pkce;
use crate::versions::{VersionCache, VersionOverrides};

/// Position in the login chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    AwaitingRedirect,
    SessionExchanged,
    IdentityExchanged,
    AccessExchanged,
    GameTokenExchanged,
    Complete,
}

impl Stage {
    /// Stage label for logging and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::AwaitingRedirect => "awaiting_redirect",
            Stage::SessionExchanged => "session_token",
            Stage::IdentityExchanged => "identity",
            Stage::AccessExchanged => "coral_login",
            Stage::GameTokenExchanged => "web_service_token",
            Stage::Complete => "bullet_token",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of `Init -> AwaitingRedirect`. The caller keeps `verifier` until
/// the redirect comes back.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub url: String,
    pub verifier: String,
    pub state: String,
}

/// Nintendo account profile from `users/me`.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub nickname: String,
    pub language: String,
    pub country: String,
    pub birthday: String,
}

impl Profile {
    fn from_value(value: &Value) -> Result<Self> {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| Error::Exchange {
                    stage: Stage::IdentityExchanged,
                    message: format!("profile has no {name}"),
                })
        };
        Ok(Self {
            id: field("id")?,
            nickname: field("nickname")?,
            language: field("language")?,
            country: field("country")?,
            birthday: field("birthday")?,
        })
    }
}

/// Output of `SessionExchanged -> IdentityExchanged`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id_token: Secret<String>,
    pub profile: Profile,
}

/// Output of `IdentityExchanged -> AccessExchanged`.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access_token: Secret<String>,
    pub coral_user_id: String,
    /// Coral user object
    pub user: Value,
}

impl AccessGrant {
    /// `None` when any expected field is missing from the login result.
    fn from_payload(payload: &Value) -> Option<Self> {
        let result = payload.get("result")?;
        let access_token = result
            .pointer("/webApiServerCredential/accessToken")?
            .as_str()?;
        let user = result.get("user")?;
        let coral_user_id = match user.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            access_token: Secret::new(access_token.to_string()),
            coral_user_id,
            user: user.clone(),
        })
    }
}

/// Drives the NSO login and token derivation chain.
pub struct NsoAuth {
    http: reqwest::Client,
    endpoints: Endpoints,
    oracle: OracleClient,
}

impl NsoAuth {
    /// Client against the public Nintendo and oracle hosts, with version
    /// overrides read from the environment.
    pub fn new(http: reqwest::Client) -> Self {
        let endpoints = Endpoints::default();
        let versions = Arc::new(VersionCache::new(
            http.clone(),
            endpoints.oracle_config(),
            VersionOverrides::from_env(),
        ));
        Self::with_endpoints(http, endpoints, versions)
    }

    pub fn with_endpoints(
        http: reqwest::Client,
        endpoints: Endpoints,
        versions: Arc<VersionCache>,
    ) -> Self {
        let oracle = OracleClient::new(http.clone(), &endpoints, versions);
        Self {
            http,
            endpoints,
            oracle,
        }
    }

    /// Replace the oracle client, e.g. to use a different oracle client ID.
    pub fn with_oracle(mut self, oracle: OracleClient) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn oracle(&self) -> &OracleClient {
        &self.oracle
    }

    pub fn versions(&self) -> &VersionCache {
        self.oracle.versions()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `Init -> AwaitingRedirect`: build the URL the user opens to log in.
    pub fn begin_login(&self) -> Result<LoginRequest> {
        let state = pkce::generate_state();
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);
        let url = pkce::build_authorization_url(&self.endpoints.authorize(), &state, &challenge)?;
        debug!(stage = %Stage::AwaitingRedirect, "login url built");
        Ok(LoginRequest {
            url,
            verifier,
            state,
        })
    }

    /// `AwaitingRedirect -> SessionExchanged`: trade the redirect's code for
    /// the session token.
    pub async fn exchange_session_token(
        &self,
        callback_url: &str,
        verifier: &str,
    ) -> Result<Secret<String>> {
        let stage = Stage::SessionExchanged;
        let code = pkce::extract_session_token_code(callback_url)?;
        let app_version = self.versions().app_version().await;

        let response = self
            .http
            .post(self.endpoints.session_token())
            .header(
                reqwest::header::USER_AGENT,
                format!("OnlineLounge/{app_version} NASDKAPI Android"),
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US")
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", NSO_CLIENT_ID),
                ("session_token_code", code.as_str()),
                ("session_token_code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("session token request failed: {e}")))?;

        let data = read_json(stage, response).await?;
        let token = require_str(stage, &data, "session_token")?;
        info!(stage = %stage, "session token obtained");
        Ok(Secret::new(token))
    }

    /// `SessionExchanged -> IdentityExchanged`: identity token and profile.
    ///
    /// An `invalid_grant` answer means the session token is dead; nothing
    /// further is attempted.
    pub async fn exchange_identity(&self, session_token: &Secret<String>) -> Result<Identity> {
        let stage = Stage::IdentityExchanged;
        let response = self
            .http
            .post(self.endpoints.identity_token())
            .header(
                reqwest::header::USER_AGENT,
                "Dalvik/2.1.0 (Linux; U; Android 14; Pixel 7a Build/UQ1A.240105.004)",
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({
                "client_id": NSO_CLIENT_ID,
                "session_token": session_token.expose(),
                "grant_type": SESSION_TOKEN_GRANT_TYPE,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("identity token request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        let data: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if data.get("error").and_then(Value::as_str) == Some("invalid_grant") {
            warn!(stage = %stage, "session token rejected");
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            return Err(Error::Exchange {
                stage,
                message: format!("token endpoint returned {status}: {}", excerpt(&text)),
            });
        }

        let id_access_token = require_str(stage, &data, "access_token")?;
        let id_token = require_str(stage, &data, "id_token")?;

        let response = self
            .http
            .get(self.endpoints.profile())
            .header(reqwest::header::USER_AGENT, "NASDKAPI; Android")
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(&id_access_token)
            .send()
            .await
            .map_err(|e| Error::Http(format!("profile request failed: {e}")))?;
        let profile = Profile::from_value(&read_json(stage, response).await?)?;

        debug!(stage = %stage, nickname = %profile.nickname, "identity exchanged");
        Ok(Identity {
            id_token: Secret::new(id_token),
            profile,
        })
    }

    /// `IdentityExchanged -> AccessExchanged`: coral login.
    ///
    /// When the decrypted answer lacks the credential fields, a fresh proof
    /// is generated and the whole exchange is retried exactly once.
    pub async fn exchange_access_token(&self, identity: &Identity) -> Result<AccessGrant> {
        let stage = Stage::AccessExchanged;
        let payload = self.coral_login(identity).await?;
        if let Some(grant) = AccessGrant::from_payload(&payload) {
            debug!(stage = %stage, "coral access token obtained");
            return Ok(grant);
        }

        let status = payload.get("status").cloned().unwrap_or_default();
        warn!(
            stage = %stage,
            status = %status,
            "coral login answer incomplete, retrying with a new proof"
        );
        let payload = self.coral_login(identity).await?;
        AccessGrant::from_payload(&payload).ok_or_else(|| Error::Exchange {
            stage,
            message: format!("login answer has no credential: {}", excerpt(&payload.to_string())),
        })
    }

    /// `AccessExchanged -> GameTokenExchanged`: SplatNet web service token.
    pub async fn exchange_game_token(
        &self,
        identity: &Identity,
        access: &AccessGrant,
    ) -> Result<Secret<String>> {
        let stage = Stage::GameTokenExchanged;
        let url = self.endpoints.coral_web_service_token();
        let parameter = json!({
            "f": "",
            "id": SPLATNET_WEB_SERVICE_ID,
            "registrationToken": access.access_token.expose(),
            "requestId": "",
            "timestamp": 0,
        });
        let proof = self
            .oracle
            .generate_proof(&ProofRequest {
                token: access.access_token.expose().clone(),
                step: ProofStep::WebServiceToken,
                na_id: identity.profile.id.clone(),
                coral_user_id: Some(access.coral_user_id.clone()),
                encrypt: Some(EncryptTokenRequest {
                    url: url.clone(),
                    parameter,
                }),
            })
            .await?;
        let encrypted = proof
            .encrypted
            .ok_or(Error::MissingEncryptedPayload { stage })?;

        let payload = self
            .coral_call(stage, &url, Some(access.access_token.expose().as_str()), &encrypted)
            .await?;

        if let Some(token) = payload.pointer("/result/accessToken").and_then(Value::as_str) {
            debug!(stage = %stage, "web service token obtained");
            return Ok(Secret::new(token.to_string()));
        }
        match payload.get("errorMessage").and_then(Value::as_str) {
            Some(MEMBERSHIP_REQUIRED_MESSAGE) => Err(Error::MembershipRequired {
                nickname: identity.profile.nickname.clone(),
            }),
            _ => Err(Error::Exchange {
                stage,
                message: format!("no web service token: {}", excerpt(&payload.to_string())),
            }),
        }
    }

    /// `GameTokenExchanged -> Complete`: SplatNet bullet token.
    pub async fn exchange_bullet_token(
        &self,
        game_token: &Secret<String>,
        profile: &Profile,
    ) -> Result<Secret<String>> {
        let stage = Stage::Complete;
        let web_view = self.versions().web_view_version().await;
        let response = self
            .http
            .post(self.endpoints.bullet_tokens())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "*/*")
            .header(reqwest::header::ACCEPT_LANGUAGE, &profile.language)
            .header(reqwest::header::USER_AGENT, APP_USER_AGENT)
            .header(reqwest::header::ORIGIN, &self.endpoints.splatnet)
            .header(
                reqwest::header::COOKIE,
                format!("_gtoken={}; _dnt=1", game_token.expose()),
            )
            .header("X-Web-View-Ver", web_view)
            .header("X-NACOUNTRY", &profile.country)
            .header("X-Requested-With", "com.nintendo.znca")
            .body(Vec::new())
            .send()
            .await
            .map_err(|e| Error::Http(format!("bullet token request failed: {e}")))?;

        let status = response.status().as_u16();
        if let Some(reason) = IssuanceFailure::from_status(status) {
            warn!(stage = %stage, status, reason = %reason, "bullet token rejected");
            return Err(Error::IssuanceRejected {
                status,
                reason,
                nickname: profile.nickname.clone(),
            });
        }

        let data = read_json(stage, response).await?;
        let token = require_str(stage, &data, "bulletToken")?;
        debug!(stage = %stage, "bullet token obtained");
        Ok(Secret::new(token))
    }

    /// Re-derive every short-lived token from a session token.
    pub async fn derive_bundle(&self, session_token: &Secret<String>) -> Result<Bundle> {
        let identity = self.exchange_identity(session_token).await?;
        let access = self.exchange_access_token(&identity).await?;
        let g_token = self.exchange_game_token(&identity, &access).await?;
        let bullet_token = self.exchange_bullet_token(&g_token, &identity.profile).await?;

        info!(nickname = %identity.profile.nickname, "credential bundle derived");
        Ok(Bundle {
            session_token: Some(session_token.clone()),
            access_token: access.access_token,
            g_token,
            bullet_token,
            user_lang: identity.profile.language,
            user_country: identity.profile.country,
            user_nickname: identity.profile.nickname,
            user_info: access.user,
            nsa_id: identity.profile.id,
        })
    }

    /// Finish a login started with [`begin_login`](Self::begin_login).
    pub async fn complete_login(&self, callback_url: &str, verifier: &str) -> Result<Bundle> {
        let session_token = self.exchange_session_token(callback_url, verifier).await?;
        self.derive_bundle(&session_token).await
    }

    async fn coral_login(&self, identity: &Identity) -> Result<Value> {
        let stage = Stage::AccessExchanged;
        let url = self.endpoints.coral_login();
        let profile = &identity.profile;
        let parameter = json!({
            "f": "",
            "language": profile.language,
            "naBirthday": profile.birthday,
            "naCountry": profile.country,
            "naIdToken": identity.id_token.expose(),
            "requestId": "",
            "timestamp": 0,
        });
        let proof = self
            .oracle
            .generate_proof(&ProofRequest {
                token: identity.id_token.expose().clone(),
                step: ProofStep::CoralLogin,
                na_id: profile.id.clone(),
                coral_user_id: None,
                encrypt: Some(EncryptTokenRequest {
                    url: url.clone(),
                    parameter,
                }),
            })
            .await?;
        let encrypted = proof
            .encrypted
            .ok_or(Error::MissingEncryptedPayload { stage })?;
        self.coral_call(stage, &url, None, &encrypted).await
    }

    /// POST an oracle-encrypted body to coral and decrypt the answer.
    async fn coral_call(
        &self,
        stage: Stage,
        url: &str,
        bearer: Option<&str>,
        encrypted: &str,
    ) -> Result<Value> {
        let body = STANDARD.decode(encrypted).map_err(|e| Error::OracleParse {
            operation: "generate_proof",
            message: format!("encrypted payload is not base64: {e}"),
        })?;
        let app_version = self.versions().app_version().await;

        let mut request = self
            .http
            .post(url)
            .header("X-Platform", "Android")
            .header("X-ProductVersion", &app_version)
            .header("X-znca-Client-Version", self.versions().client_version())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(
                reqwest::header::ACCEPT,
                "application/octet-stream, application/json",
            )
            .header(
                reqwest::header::USER_AGENT,
                format!("com.nintendo.znca/{app_version}(Android/14)"),
            )
            .body(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("{stage} request failed: {e}")))?;
        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("{stage} response read failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Exchange {
                stage,
                message: format!("coral returned {status}"),
            });
        }

        let plain = self.oracle.decrypt_response(&raw).await?;
        serde_json::from_str(&plain).map_err(|e| Error::Exchange {
            stage,
            message: format!("decrypted answer is not JSON: {e}"),
        })
    }
}

async fn read_json(stage: Stage, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    if !status.is_success() {
        return Err(Error::Exchange {
            stage,
            message: format!("endpoint returned {status}: {}", excerpt(&text)),
        });
    }
    serde_json::from_str(&text).map_err(|e| Error::Exchange {
        stage,
        message: format!("invalid JSON: {e}"),
    })
}

fn require_str(stage: Stage, data: &Value, field: &str) -> Result<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::Exchange {
            stage,
            message: format!("response has no {field}"),
        })
}
