//! # Hub Configuration
//!
//! Loaded once at startup from a TOML file. A missing file means defaults.
//! Secrets never live in the file: they are read from the environment.

use serde::Deserialize;
use sf_core::{Catalog, CatalogError, CriteriaTypeSpec, EmptyValuePolicy};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid catalog override: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub snowflake: SnowflakeConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Externally reachable base URL; export links are built from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_slack_api")]
    pub api_base: String,
    /// Maximum accepted age of a signed request.
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: default_slack_api(),
            signature_tolerance_secs: default_signature_tolerance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    #[serde(default = "default_presto_url")]
    pub url: String,
    #[serde(default = "default_presto_user")]
    pub user: String,
    #[serde(default = "default_presto_catalog")]
    pub catalog: String,
    #[serde(default = "default_presto_schema")]
    pub schema: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: default_presto_url(),
            user: default_presto_user(),
            catalog: default_presto_catalog(),
            schema: default_presto_schema(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Snowflake SQL API, used for the operational reports (tickets, query
/// history). Either `account` or an explicit `url` must be set.
#[derive(Debug, Deserialize, Clone)]
pub struct SnowflakeConfig {
    /// Account identifier, e.g. `myorg-myaccount`.
    #[serde(default)]
    pub account: Option<String>,
    /// Overrides the URL derived from `account`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// `X-Snowflake-Authorization-Token-Type` sent with `SNOWFLAKE_TOKEN`.
    #[serde(default = "default_snowflake_token_type")]
    pub token_type: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SnowflakeConfig {
    fn default() -> Self {
        Self {
            account: None,
            url: None,
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            token_type: default_snowflake_token_type(),
            timeout_secs: default_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl SnowflakeConfig {
    pub fn base_url(&self) -> Option<String> {
        match (&self.url, &self.account) {
            (Some(url), _) => Some(url.trim_end_matches('/').to_string()),
            (None, Some(account)) => Some(format!("https://{}.snowflakecomputing.com", account)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResolverConfig {
    #[serde(default)]
    pub empty_values: EmptyValuePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
    /// Exported files older than this are deleted.
    #[serde(default = "default_export_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            ttl_secs: default_export_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Extra or replacement criteria types layered over the built-in table.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub overrides: Vec<CriteriaTypeSpec>,
}

fn default_public_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_slack_api() -> String {
    "https://slack.com/api".into()
}
fn default_signature_tolerance() -> i64 {
    300
}
fn default_presto_url() -> String {
    "https://presto-gateway.presto.fw1.aws.fwmrm.net:8080".into()
}
fn default_presto_user() -> String {
    "svx-script-runner".into()
}
fn default_presto_catalog() -> String {
    "fw".into()
}
fn default_presto_schema() -> String {
    "default".into()
}
fn default_timeout() -> u64 {
    120
}
fn default_snowflake_token_type() -> String {
    "OAUTH".into()
}
fn default_poll_interval() -> u64 {
    500
}
fn default_export_ttl() -> u64 {
    1800
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl HubConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("Config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Built-in catalog with the configured overrides applied.
    pub fn build_catalog(&self) -> Result<Catalog, ConfigError> {
        Ok(Catalog::builtin().with_overrides(self.catalog.overrides.iter().cloned())?)
    }
}

/// Credentials taken from the process environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub presto_token: Option<String>,
    pub snowflake_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            slack_bot_token: var("SLACK_BOT_TOKEN"),
            slack_signing_secret: var("SLACK_SIGNING_SECRET"),
            presto_token: var("PRESTO_TOKEN"),
            snowflake_token: var("SNOWFLAKE_TOKEN"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("slack_bot_token", &mask(&self.slack_bot_token))
            .field("slack_signing_secret", &mask(&self.slack_signing_secret))
            .field("presto_token", &mask(&self.presto_token))
            .field("snowflake_token", &mask(&self.snowflake_token))
            .finish()
    }
}
