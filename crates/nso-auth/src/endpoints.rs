//! Remote base URLs
//!
//! Every host the login flow and the API touch, grouped so a whole
//! deployment can be pointed at a local mock or a self-hosted oracle.

/// Base URLs for the accounts site, coral, SplatNet and the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// accounts.nintendo.com (authorize, session token, identity token)
    pub accounts: String,
    /// api.accounts.nintendo.com (profile)
    pub accounts_api: String,
    /// Coral, the NSO app backend
    pub coral: String,
    /// SplatNet 3 web service
    pub splatnet: String,
    /// Oracle API root; `/f`, `/decrypt-response`, `/encrypt-request` and
    /// `/config` hang off it
    pub oracle: String,
    /// Oracle client-credentials token endpoint
    pub oracle_token: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            accounts: "https://accounts.nintendo.com".into(),
            accounts_api: "https://api.accounts.nintendo.com".into(),
            coral: "https://api-lp1.znc.srv.nintendo.net".into(),
            splatnet: "https://api.lp1.av5ja.srv.nintendo.net".into(),
            oracle: "https://nxapi-znca-api.fancy.org.uk/api/znca".into(),
            oracle_token: "https://nxapi-auth.fancy.org.uk/api/oauth/token".into(),
        }
    }
}

impl Endpoints {
    /// Point every service at one host, e.g. a local mock server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            accounts: base.into(),
            accounts_api: base.into(),
            coral: base.into(),
            splatnet: base.into(),
            oracle: base.into(),
            oracle_token: format!("{base}/api/oauth/token"),
        }
    }

    pub fn authorize(&self) -> String {
        format!("{}/connect/1.0.0/authorize", self.accounts)
    }

    pub fn session_token(&self) -> String {
        format!("{}/connect/1.0.0/api/session_token", self.accounts)
    }

    pub fn identity_token(&self) -> String {
        format!("{}/connect/1.0.0/api/token", self.accounts)
    }

    pub fn profile(&self) -> String {
        format!("{}/2.0.0/users/me", self.accounts_api)
    }

    pub fn coral_login(&self) -> String {
        format!("{}/v4/Account/Login", self.coral)
    }

    pub fn coral_web_service_token(&self) -> String {
        format!("{}/v4/Game/GetWebServiceToken", self.coral)
    }

    pub fn coral_friend_list(&self) -> String {
        format!("{}/v4/Friend/List", self.coral)
    }

    pub fn coral_show_self(&self) -> String {
        format!("{}/v4/User/ShowSelf", self.coral)
    }

    pub fn bullet_tokens(&self) -> String {
        format!("{}/api/bullet_tokens", self.splatnet)
    }

    pub fn graphql(&self) -> String {
        format!("{}/api/graphql", self.splatnet)
    }

    pub fn oracle_proof(&self) -> String {
        format!("{}/f", self.oracle)
    }

    pub fn oracle_decrypt(&self) -> String {
        format!("{}/decrypt-response", self.oracle)
    }

    pub fn oracle_encrypt(&self) -> String {
        format!("{}/encrypt-request", self.oracle)
    }

    pub fn oracle_config(&self) -> String {
        format!("{}/config", self.oracle)
    }
}
