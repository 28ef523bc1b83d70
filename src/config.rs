//! Process configuration read from the environment (and `.env`)

use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DispatchConfig;
use crate::error::{DeployError, Result};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_DATABASE_PATH: &str = "webhook.db";
const DEFAULT_DISCOVERY_URL: &str = "http://discoverd:1111";
const DEFAULT_CONTROLLER_SERVICE: &str = "controller";
const DISCOVERY_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    pub secret_token: String,
    pub bind_host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// When set, mappings come from this TOML file instead of the database
    pub mappings_file: Option<PathBuf>,
    pub controller_url: Option<String>,
    pub controller_key: Option<String>,
    pub discovery_url: String,
    pub controller_service: String,
    pub discovery_wait: Duration,
    pub log_dir: Option<PathBuf>,
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_token = get("SECRET_TOKEN").ok_or_else(|| {
            DeployError::ConfigError("missing SECRET_TOKEN environment variable".to_string())
        })?;

        let port = match get("PORT") {
            Some(p) => parse_var("PORT", &p)?,
            None => DEFAULT_PORT,
        };

        let mut dispatch = DispatchConfig::default();
        if let Some(app) = get("DEPLOYER_APP") {
            dispatch.deployer_app = app;
        }
        if let Some(cmd) = get("DEPLOYER_CMD") {
            dispatch.deployer_cmd = cmd;
        }
        if let Some(max) = get("MAX_CONCURRENT_DEPLOYS") {
            let max: usize = parse_var("MAX_CONCURRENT_DEPLOYS", &max)?;
            if max == 0 {
                return Err(DeployError::ConfigError(
                    "MAX_CONCURRENT_DEPLOYS must be at least 1".to_string(),
                ));
            }
            dispatch.max_concurrent = Some(max);
        }
        if let Some(serialize) = get("SERIALIZE_DEPLOYS_PER_APP") {
            dispatch.serialize_per_app = parse_var("SERIALIZE_DEPLOYS_PER_APP", &serialize)?;
        }
        if let Some(secs) = get("DEPLOY_TIMEOUT_SECS") {
            dispatch.attach_timeout =
                Some(Duration::from_secs(parse_var("DEPLOY_TIMEOUT_SECS", &secs)?));
        }

        Ok(Self {
            secret_token,
            bind_host: get("BIND_HOST").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            port,
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
                .into(),
            mappings_file: get("MAPPINGS_FILE").map(PathBuf::from),
            controller_url: get("CONTROLLER_URL"),
            controller_key: get("CONTROLLER_KEY"),
            discovery_url: get("DISCOVERY_URL").unwrap_or_else(|| DEFAULT_DISCOVERY_URL.to_string()),
            controller_service: get("CONTROLLER_SERVICE")
                .unwrap_or_else(|| DEFAULT_CONTROLLER_SERVICE.to_string()),
            discovery_wait: DISCOVERY_WAIT,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            dispatch,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DeployError::ConfigError(format!("invalid {} '{}': {}", key, value, e)))
}
