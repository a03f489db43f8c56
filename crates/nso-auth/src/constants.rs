//! Nintendo Switch Online client constants
//!
//! Public identifiers of the NSO mobile app and the f-token oracle client.
//! None of these are secrets; the session token and everything derived from
//! it are handled by the credential bundle.

/// Nintendo account client ID of the NSO mobile app
pub const NSO_CLIENT_ID: &str = "71b963c1b7b6d119";

/// Custom-scheme redirect the accounts site sends the session token code to
pub const REDIRECT_URI: &str = "npf71b963c1b7b6d119://auth";

/// Scopes requested during the browser login step
pub const SCOPES: &str = "openid user user.birthday user.mii user.screenName";

/// Grant type used when exchanging a session token for an identity token
pub const SESSION_TOKEN_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:jwt-bearer-session-token";

/// OAuth client ID registered with the f-token oracle
pub const ORACLE_CLIENT_ID: &str = "EJ5mqnRSwmWfOPmRDIRGwg";

/// Oracle scopes: proof generation, request encryption, response decryption
pub const ORACLE_SCOPES: &str = "ca:gf ca:er ca:dr";

/// Fallback NSO app version when neither override nor discovery yields one
pub const APP_VERSION_FALLBACK: &str = "3.2.0";

/// Fallback SplatNet web view version
pub const WEB_VIEW_VERSION_FALLBACK: &str = "10.0.0-cba84fcd";

/// Static client version accepted by older oracle deployments.
/// Newer deployments hand out a per-client value on authentication.
pub const CLIENT_VERSION_FALLBACK: &str = "hio87-mJks_e9GNF";

/// Environment overrides for the three version strings
pub const APP_VERSION_ENV: &str = "SPLATOON3_NSOAPP_VERSION";
pub const WEB_VIEW_VERSION_ENV: &str = "SPLATOON3_WEB_VIEW_VERSION";
pub const CLIENT_VERSION_ENV: &str = "SPLATOON3_ZNCA_CLIENT_VERSION";

/// Browser user agent presented to SplatNet
pub const APP_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 7a) \
    AppleWebKit/537.36 (KHTML, like Gecko) \
    Chrome/120.0.6099.230 Mobile Safari/537.36";

/// User agent presented to the oracle
pub const ORACLE_USER_AGENT: &str = "splatoon3_assistant/0.1.1";

/// Web service ID of SplatNet 3 inside the NSO app
pub const SPLATNET_WEB_SERVICE_ID: u64 = 4834290508791808;

/// Coral error message signalling a lapsed NSO membership
pub const MEMBERSHIP_REQUIRED_MESSAGE: &str = "Membership required error.";

/// Language and country assumed before a profile has been fetched
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_COUNTRY: &str = "JP";
