//! SplatNet 3 command-line client
//!
//! Single binary that:
//! 1. Logs an account in through the NSO app flow and stores its bundle
//! 2. Queries SplatNet 3 and the NSO app API with the stored bundle
//! 3. Writes refreshed bundles back to the store as they are issued

mod config;
mod persist;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nso_auth::{BundleStore, Endpoints, NsoAuth, OracleClient, VersionCache, VersionOverrides};
use splatnet::SplatNet;

use crate::config::Config;
use crate::persist::StoreBinding;

#[derive(Debug, Parser)]
#[command(name = "splatnet", version, about = "SplatNet 3 client")]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./splatnet.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Account to act as, overriding store.account
    #[arg(long, global = true, env = "SPLATNET_ACCOUNT")]
    account: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in through the NSO app flow and store the resulting bundle
    Login {
        /// Redirect URL copied from the browser; prompted for when absent
        #[arg(long)]
        callback: Option<String>,
    },
    /// Run a query and print the JSON result
    Fetch {
        #[command(subcommand)]
        target: Target,
    },
    /// Re-derive the stored bundle from its session token
    Refresh,
    /// Check that the stored bundle can reach SplatNet
    Check,
    /// Print the resolved app, web view and oracle client versions
    Versions,
    /// List stored accounts
    Accounts,
    /// Forget the stored bundle for the account
    Logout,
}

#[derive(Debug, Subcommand)]
enum Target {
    Home,
    /// Latest battles across all modes
    Battles,
    RegularBattles,
    BankaraBattles,
    XBattles,
    EventBattles,
    PrivateBattles,
    Battle { id: String },
    LatestBattleId,
    Coops,
    Coop { id: String },
    XRanking {
        #[arg(long, default_value = splatnet::DEFAULT_X_RANKING_REGION)]
        region: String,
    },
    HistorySummary,
    Friends,
    WeaponRecords,
    StageRecords,
    Schedules,
    /// NSO app friend list
    AppFriends,
    /// NSO app profile
    AppMe,
    /// Any persisted query by name
    Query {
        operation: String,
        /// Variables as a JSON object
        #[arg(long, default_value = "{}")]
        variables: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let account = cli.account.unwrap_or_else(|| config.store.account.clone());

    info!(
        config = %config_path.display(),
        store = %config.store.path.display(),
        account = %account,
        "configuration loaded"
    );

    let auth = Arc::new(build_auth(&config)?);
    let store = Arc::new(
        BundleStore::load(config.store.path.clone())
            .await
            .with_context(|| format!("failed to open bundle store {}", config.store.path.display()))?,
    );

    match cli.command {
        Command::Login { callback } => login(&auth, &store, &account, callback).await,
        Command::Versions => {
            let versions = auth.versions();
            print_json(&serde_json::json!({
                "app": versions.app_version().await,
                "web_view": versions.web_view_version().await,
                "client": versions.client_version(),
            }))
        }
        Command::Accounts => {
            for id in store.account_ids().await {
                let expired = store
                    .get(&id)
                    .await
                    .is_some_and(|stored| stored.session_expired);
                println!("{id}{}", if expired { " (login required)" } else { "" });
            }
            Ok(())
        }
        Command::Logout => logout(&store, &account).await,
        Command::Refresh => {
            let api = client(auth, &store, &account).await?;
            let bundle = api.refresh().await?;
            info!(nickname = %bundle.user_nickname, "bundle refreshed");
            Ok(())
        }
        Command::Check => {
            let api = client(auth, &store, &account).await?;
            if api.test_connection().await? {
                println!("ok");
                Ok(())
            } else {
                bail!("SplatNet did not answer the home query")
            }
        }
        Command::Fetch { target } => {
            let api = client(auth, &store, &account).await?;
            let data = fetch(&api, target).await?;
            match data {
                Some(data) => print_json(&data),
                None => bail!("SplatNet rejected the stored tokens and no refresh was possible"),
            }
        }
    }
}

/// Auth client over an HTTP client built from the `[http]` and `[oracle]`
/// sections.
fn build_auth(config: &Config) -> Result<NsoAuth> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(config.http.timeout_secs));
    if let Some(proxy) = &config.http.proxy {
        builder = builder.proxy(
            reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy {proxy}"))?,
        );
    }
    let http = builder.build().context("failed to build HTTP client")?;

    let mut endpoints = Endpoints::default();
    if let Some(base) = &config.oracle.base_url {
        endpoints.oracle = base.trim_end_matches('/').to_string();
    }
    if let Some(auth_url) = &config.oracle.auth_url {
        endpoints.oracle_token = auth_url.clone();
    }

    let versions = Arc::new(VersionCache::new(
        http.clone(),
        endpoints.oracle_config(),
        VersionOverrides::from_env(),
    ));
    let mut auth = NsoAuth::with_endpoints(http.clone(), endpoints.clone(), versions.clone());
    if let Some(client_id) = &config.oracle.client_id {
        auth = auth.with_oracle(
            OracleClient::new(http, &endpoints, versions).with_client_id(client_id.clone()),
        );
    }
    Ok(auth)
}

async fn login(
    auth: &NsoAuth,
    store: &BundleStore,
    account: &str,
    callback: Option<String>,
) -> Result<()> {
    let request = auth.begin_login()?;
    let callback = match callback {
        Some(callback) => callback,
        None => {
            println!("Open this URL, log in, then right-click \"Select this person\" and copy the link:");
            println!("{}", request.url);
            print!("Paste the link: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .context("failed to read the redirect link")?;
            line.trim().to_string()
        }
    };

    let bundle = auth.complete_login(&callback, &request.verifier).await?;
    info!(account, nickname = %bundle.user_nickname, "login complete");
    store.put(account, bundle).await?;
    Ok(())
}

async fn logout(store: &BundleStore, account: &str) -> Result<()> {
    match store.remove(account).await? {
        Some(_) => {
            info!(account, "stored bundle removed");
            Ok(())
        }
        None => bail!("no stored bundle for account {account}"),
    }
}

/// API client for `account`, wired to persist refreshed bundles.
async fn client(auth: Arc<NsoAuth>, store: &Arc<BundleStore>, account: &str) -> Result<SplatNet> {
    let Some(stored) = store.get(account).await else {
        bail!("no stored bundle for account {account}, run `splatnet login` first");
    };
    if stored.session_expired {
        bail!("session for account {account} has expired, run `splatnet login` again");
    }

    let binding = Arc::new(StoreBinding::new(store.clone(), account));
    Ok(SplatNet::new(auth, stored.bundle)
        .with_token_sink(binding.clone())
        .with_expiry_handler(binding))
}

async fn fetch(api: &SplatNet, target: Target) -> Result<Option<Value>> {
    let data = match target {
        Target::Home => api.home().await?,
        Target::Battles => api.recent_battles().await?,
        Target::RegularBattles => api.regular_battles().await?,
        Target::BankaraBattles => api.bankara_battles().await?,
        Target::XBattles => api.x_battles().await?,
        Target::EventBattles => api.event_battles().await?,
        Target::PrivateBattles => api.private_battles().await?,
        Target::Battle { id } => api.battle_detail(&id).await?,
        Target::LatestBattleId => api.latest_battle_id().await?.map(Value::String),
        Target::Coops => api.coops().await?,
        Target::Coop { id } => api.coop_detail(&id).await?,
        Target::XRanking { region } => api.x_ranking(&region).await?,
        Target::HistorySummary => api.history_summary().await?,
        Target::Friends => api.friends().await?,
        Target::WeaponRecords => api.weapon_records().await?,
        Target::StageRecords => api.stage_records().await?,
        Target::Schedules => api.schedules().await?,
        Target::AppFriends => Some(api.app_friend_list().await?),
        Target::AppMe => Some(api.app_myself().await?),
        Target::Query {
            operation,
            variables,
        } => {
            let variables: Map<String, Value> = serde_json::from_str(&variables)
                .context("--variables must be a JSON object")?;
            api.query(&operation, variables).await?
        }
    };
    Ok(data)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_battle_takes_an_id() {
        let cli = Cli::parse_from(["splatnet", "fetch", "battle", "VsHistoryDetail-1"]);
        assert!(matches!(
            cli.command,
            Command::Fetch { target: Target::Battle { ref id } } if id == "VsHistoryDetail-1"
        ));
    }

    #[test]
    fn x_ranking_region_defaults() {
        let cli = Cli::parse_from(["splatnet", "fetch", "x-ranking"]);
        let Command::Fetch {
            target: Target::XRanking { region },
        } = cli.command
        else {
            panic!("expected x-ranking");
        };
        assert_eq!(region, "ATLANTIC");
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["splatnet", "check", "--config", "/etc/splatnet.toml", "--account", "alt"]);
        assert_eq!(cli.config.as_deref(), Some("/etc/splatnet.toml"));
        assert_eq!(cli.account.as_deref(), Some("alt"));
    }

    #[tokio::test]
    async fn logout_removes_only_that_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::load(dir.path().join("bundles.json")).await.unwrap();
        let bundle = nso_auth::Bundle::without_session("g", "b").with_session_token("st");
        store.put("main", bundle.clone()).await.unwrap();
        store.put("alt", bundle).await.unwrap();

        logout(&store, "main").await.unwrap();
        assert_eq!(store.account_ids().await, vec!["alt".to_string()]);
        assert!(logout(&store, "main").await.is_err());
    }

    #[test]
    fn oracle_overrides_reach_the_auth_client() {
        let mut config = Config::default();
        config.oracle.base_url = Some("https://oracle.example/api/znca/".into());
        config.oracle.auth_url = Some("https://oracle.example/token".into());

        let auth = build_auth(&config).unwrap();
        assert_eq!(auth.endpoints().oracle, "https://oracle.example/api/znca");
        assert_eq!(auth.endpoints().oracle_token, "https://oracle.example/token");
        assert_eq!(auth.endpoints().splatnet, Endpoints::default().splatnet);
    }
}
