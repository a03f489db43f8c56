//! f-token oracle client
//!
//! The coral endpoints only accept requests signed and encrypted the way the
//! real NSO app does it. The oracle performs that work for us: it generates
//! the `f` proof, encrypts outbound coral requests and decrypts coral
//! responses. All three calls share one client-credentials bearer token.
//!
//! Token policy: the bearer token is fetched lazily before the first call.
//! If the oracle reports it invalid (HTTP 401 or `"error": "invalid_token"`),
//! the client re-authenticates once and retries once. A second rejection
//! fails the call.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::constants::{ORACLE_CLIENT_ID, ORACLE_SCOPES, ORACLE_USER_AGENT};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result, excerpt};
use crate::versions::VersionCache;

/// Which coral token a proof is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofStep {
    /// `Account/Login`: identity token in, coral access token out
    CoralLogin,
    /// `Game/GetWebServiceToken`: coral access token in, game web token out
    WebServiceToken,
}

impl ProofStep {
    fn hash_method(self) -> u8 {
        match self {
            ProofStep::CoralLogin => 1,
            ProofStep::WebServiceToken => 2,
        }
    }
}

/// Coral request the oracle should encrypt alongside the proof.
#[derive(Debug, Clone, Serialize)]
pub struct EncryptTokenRequest {
    pub url: String,
    pub parameter: Value,
}

/// Input to [`OracleClient::generate_proof`].
#[derive(Debug, Clone)]
pub struct ProofRequest {
    /// Identity token (step 1) or coral access token (step 2)
    pub token: String,
    pub step: ProofStep,
    /// Nintendo account ID
    pub na_id: String,
    /// Coral user ID, sent only for step 2
    pub coral_user_id: Option<String>,
    pub encrypt: Option<EncryptTokenRequest>,
}

/// Proof triple plus the encrypted request body, if one was asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    pub f: String,
    pub request_id: String,
    pub timestamp: i64,
    /// Base64 body to POST to coral
    pub encrypted: Option<String>,
}

enum Reply {
    Accepted(Value),
    InvalidToken,
}

/// Client for the oracle's token, proof, encrypt and decrypt endpoints.
pub struct OracleClient {
    http: reqwest::Client,
    token_url: String,
    proof_url: String,
    decrypt_url: String,
    encrypt_url: String,
    client_id: String,
    token: RwLock<Option<Secret<String>>>,
    versions: Arc<VersionCache>,
}

impl OracleClient {
    pub fn new(http: reqwest::Client, endpoints: &Endpoints, versions: Arc<VersionCache>) -> Self {
        Self {
            http,
            token_url: endpoints.oracle_token.clone(),
            proof_url: endpoints.oracle_proof(),
            decrypt_url: endpoints.oracle_decrypt(),
            encrypt_url: endpoints.oracle_encrypt(),
            client_id: ORACLE_CLIENT_ID.to_string(),
            token: RwLock::new(None),
            versions,
        }
    }

    /// Use a different registered oracle client.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn versions(&self) -> &Arc<VersionCache> {
        &self.versions
    }

    /// Run the client-credentials exchange and store the bearer token.
    ///
    /// Safe to call again at any time; the newest token replaces the old one.
    /// A client version in the response replaces the cached one.
    pub async fn authenticate(&self) -> Result<()> {
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::USER_AGENT, ORACLE_USER_AGENT)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("scope", ORACLE_SCOPES),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("oracle token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if !status.is_success() {
            return Err(Error::OracleStatus {
                operation: "authenticate",
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| Error::OracleParse {
            operation: "authenticate",
            message: format!("{e}, body: {}", excerpt(&body)),
        })?;

        let Some(access_token) = data.get("access_token").and_then(Value::as_str) else {
            return Err(match data.get("error") {
                Some(err) => Error::OracleRejected {
                    operation: "authenticate",
                    detail: describe_error(err, data.get("error_description")),
                },
                None => Error::OracleParse {
                    operation: "authenticate",
                    message: "response has no access_token".into(),
                },
            });
        };

        if let Some(version) = data
            .get("client_version")
            .or_else(|| data.get("znca_client_version"))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
        {
            self.versions.set_client_version(version);
        }

        *self.token.write() = Some(Secret::new(access_token.to_string()));
        info!("oracle client authenticated");
        Ok(())
    }

    /// Ask the oracle for an `f` proof and, optionally, an encrypted coral body.
    pub async fn generate_proof(&self, request: &ProofRequest) -> Result<Proof> {
        let mut body = json!({
            "token": request.token,
            "hash_method": request.step.hash_method(),
            "na_id": request.na_id,
        });
        if let (ProofStep::WebServiceToken, Some(coral_user_id)) =
            (request.step, &request.coral_user_id)
        {
            body["coral_user_id"] = json!(coral_user_id);
        }
        if let Some(encrypt) = &request.encrypt {
            body["encrypt_token_request"] = json!(encrypt);
        }

        let data = self.call("generate_proof", &self.proof_url, &body).await?;
        let field = |name: &str| {
            data.get(name).cloned().ok_or_else(|| Error::OracleParse {
                operation: "generate_proof",
                message: format!("response has no {name}"),
            })
        };

        let f = field("f")?;
        let request_id = field("request_id")?;
        let timestamp = field("timestamp")?;
        let proof = Proof {
            f: as_string(&f),
            request_id: as_string(&request_id),
            timestamp: timestamp
                .as_i64()
                .or_else(|| timestamp.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| Error::OracleParse {
                    operation: "generate_proof",
                    message: format!("timestamp is not an integer: {timestamp}"),
                })?,
            encrypted: [
                "encrypted_token_request",
                "encrypted",
                "encrypt_request",
                "request",
            ]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_str))
            .find(|v| !v.is_empty())
            .map(str::to_owned),
        };
        debug!(step = ?request.step, encrypted = proof.encrypted.is_some(), "oracle proof generated");
        Ok(proof)
    }

    /// Decrypt a raw coral response body into its plaintext JSON string.
    pub async fn decrypt_response(&self, encrypted: &[u8]) -> Result<String> {
        let body = json!({ "data": STANDARD.encode(encrypted) });
        let data = self.call("decrypt_response", &self.decrypt_url, &body).await?;
        data.get("data")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::OracleParse {
                operation: "decrypt_response",
                message: "response has no data".into(),
            })
    }

    /// Encrypt a coral request body for `url`, authorised by `token`.
    pub async fn encrypt_request(&self, url: &str, token: &str, body: &Value) -> Result<Vec<u8>> {
        let payload = json!({
            "url": url,
            "token": token,
            "data": body.to_string(),
        });
        let data = self.call("encrypt_request", &self.encrypt_url, &payload).await?;
        let encoded = data
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::OracleParse {
                operation: "encrypt_request",
                message: "response has no data".into(),
            })?;
        STANDARD.decode(encoded).map_err(|e| Error::OracleParse {
            operation: "encrypt_request",
            message: format!("data is not base64: {e}"),
        })
    }

    async fn call(&self, operation: &'static str, url: &str, body: &Value) -> Result<Value> {
        match self.post(operation, url, body).await? {
            Reply::Accepted(data) => Ok(data),
            Reply::InvalidToken => {
                warn!(operation, "oracle token rejected, re-authenticating");
                self.authenticate().await?;
                match self.post(operation, url, body).await? {
                    Reply::Accepted(data) => Ok(data),
                    Reply::InvalidToken => Err(Error::OracleRejected {
                        operation,
                        detail: "invalid_token after re-authentication".into(),
                    }),
                }
            }
        }
    }

    async fn post(&self, operation: &'static str, url: &str, body: &Value) -> Result<Reply> {
        let bearer = self.bearer().await?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::USER_AGENT, ORACLE_USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json; charset=utf-8")
            .header("X-znca-Platform", "Android")
            .header("X-znca-Version", self.versions.app_version().await)
            .header("X-znca-Client-Version", self.versions.client_version())
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("oracle {operation} request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(Reply::InvalidToken);
        }
        if !status.is_success() {
            return Err(Error::OracleStatus {
                operation,
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }

        let data: Value = serde_json::from_str(&text).map_err(|e| Error::OracleParse {
            operation,
            message: format!("{e}, body: {}", excerpt(&text)),
        })?;

        match data.get("error") {
            Some(err) if err.as_str() == Some("invalid_token") => Ok(Reply::InvalidToken),
            Some(err) => Err(Error::OracleRejected {
                operation,
                detail: describe_error(err, data.get("error_description")),
            }),
            None => Ok(Reply::Accepted(data)),
        }
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.token.read().as_ref() {
            return Ok(token.expose().clone());
        }
        self.authenticate().await?;
        self.token
            .read()
            .as_ref()
            .map(|t| t.expose().clone())
            .ok_or_else(|| Error::OracleParse {
                operation: "authenticate",
                message: "no token stored after authentication".into(),
            })
    }
}

fn as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe_error(error: &Value, description: Option<&Value>) -> String {
    let error = as_string(error);
    match description.and_then(Value::as_str) {
        Some(desc) => format!("{error}: {desc}"),
        None => error,
    }
}
