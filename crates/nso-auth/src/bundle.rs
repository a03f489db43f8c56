//! Credential bundle
//!
//! Everything SplatNet needs to authorise a request, plus the session token
//! that can re-derive it. A bundle is an immutable snapshot: a login or a
//! refresh produces a new one that replaces the old wholesale.

use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_COUNTRY, DEFAULT_LANGUAGE};

/// One account's derived credentials and profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Long-lived root credential. Without it the bundle cannot be refreshed.
    #[serde(default)]
    pub session_token: Option<Secret<String>>,
    /// Coral access token, used for app API calls
    pub access_token: Secret<String>,
    /// Game web token, sent to SplatNet as the `_gtoken` cookie
    pub g_token: Secret<String>,
    /// SplatNet bearer token
    pub bullet_token: Secret<String>,
    pub user_lang: String,
    pub user_country: String,
    #[serde(default)]
    pub user_nickname: String,
    /// Coral user object returned by the login exchange
    #[serde(default)]
    pub user_info: Value,
    /// Nintendo account ID
    #[serde(default)]
    pub nsa_id: String,
}

impl Bundle {
    /// Bundle from previously issued tokens, with no way to refresh them.
    pub fn without_session(g_token: impl Into<String>, bullet_token: impl Into<String>) -> Self {
        Self {
            session_token: None,
            access_token: Secret::new(String::new()),
            g_token: Secret::new(g_token.into()),
            bullet_token: Secret::new(bullet_token.into()),
            user_lang: DEFAULT_LANGUAGE.into(),
            user_country: DEFAULT_COUNTRY.into(),
            user_nickname: String::new(),
            user_info: Value::Null,
            nsa_id: String::new(),
        }
    }

    /// Attach a session token so the bundle can be refreshed.
    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(Secret::new(session_token.into()));
        self
    }

    pub fn can_refresh(&self) -> bool {
        self.session_token
            .as_ref()
            .is_some_and(|t| !t.expose().is_empty())
    }
}
