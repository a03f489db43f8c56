//! PKCE and login URL handling for the Nintendo account browser step
//!
//! The accounts site redirects to a custom-scheme URL carrying a session
//! token code. The verifier generated here proves the later exchange came
//! from the party that started the login.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::{NSO_CLIENT_ID, REDIRECT_URI, SCOPES};
use crate::error::{Error, Result};
use crate::exchange::Stage;

/// Generate a random PKCE code verifier.
///
/// 32 random bytes, URL-safe base64 without padding (43 characters).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate the opaque `state` value, 36 random bytes encoded like the verifier.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 36];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))` with padding stripped.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization URL the user opens in a browser.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    state: &str,
    challenge: &str,
) -> Result<String> {
    let url = Url::parse_with_params(
        authorize_endpoint,
        &[
            ("state", state),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", NSO_CLIENT_ID),
            ("scope", SCOPES),
            ("response_type", "session_token_code"),
            ("session_token_code_challenge", challenge),
            ("session_token_code_challenge_method", "S256"),
            ("theme", "login_form"),
        ],
    )
    .map_err(|e| Error::Exchange {
        stage: Stage::AwaitingRedirect,
        message: format!("bad authorize endpoint {authorize_endpoint}: {e}"),
    })?;
    Ok(url.into())
}

/// Pull the session token code out of the redirect URL.
///
/// The accounts site puts it in the fragment; a query string is accepted too
/// since some browsers rewrite custom-scheme links when copied.
pub fn extract_session_token_code(callback_url: &str) -> Result<String> {
    let url = Url::parse(callback_url.trim())
        .map_err(|e| Error::InvalidCallback(format!("not a URL: {e}")))?;

    let from_pairs = |raw: &str| {
        url::form_urlencoded::parse(raw.as_bytes())
            .find(|(key, _)| key == "session_token_code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
    };

    url.fragment()
        .and_then(from_pairs)
        .or_else(|| url.query().and_then(from_pairs))
        .ok_or_else(|| Error::InvalidCallback("missing session_token_code".into()))
}
