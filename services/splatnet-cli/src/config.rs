//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens never live in the TOML; they are kept in the bundle store file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

/// Where bundles are persisted and which account to act as
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_account")]
    pub account: String,
}

/// Outbound HTTP client settings
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Proxy for every outbound request, overridden by SPLATNET_PROXY
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Crypto oracle overrides; unset fields use the public oracle
#[derive(Debug, Default, Deserialize)]
pub struct OracleConfig {
    /// API root hosting `/f`, `/config` and the encrypt/decrypt endpoints
    #[serde(default)]
    pub base_url: Option<String>,
    /// Client-credentials token endpoint
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            account: default_account(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            proxy: None,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("splatnet-bundles.json")
}

fn default_account() -> String {
    "default".into()
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(proxy) = std::env::var("SPLATNET_PROXY") {
            let proxy = proxy.trim().to_owned();
            if !proxy.is_empty() {
                config.http.proxy = Some(proxy);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.http.timeout_secs == 0 {
            return Err(common::Error::invalid(
                "http.timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(common::Error::invalid("store.path", "must not be empty"));
        }

        if self.store.account.trim().is_empty() {
            return Err(common::Error::invalid("store.account", "must not be empty"));
        }

        let urls = [
            ("http.proxy", &self.http.proxy),
            ("oracle.base_url", &self.oracle.base_url),
            ("oracle.auth_url", &self.oracle.auth_url),
        ];
        for (key, url) in urls {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(common::Error::invalid(
                        key,
                        format!("must start with http:// or https://, got: {url}"),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("splatnet.toml")
    }
}
