//! Service discovery lookups used once at startup

use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{DeployError, Result};
use crate::runner::ControllerClient;

/// Metadata key holding the controller's auth key
pub const AUTH_KEY_META: &str = "AUTH_KEY";

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Upper bound on a single lookup; the overall wait can cut it shorter
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Instance {
    pub addr: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Client for the discovery service's HTTP API
pub struct Discovery {
    http: reqwest::Client,
    base_url: String,
}

impl Discovery {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Polls until `service` has at least one instance or `wait` elapses.
    pub async fn instances(&self, service: &str, wait: Duration) -> Result<Vec<Instance>> {
        let url = format!("{}/services/{}/instances", self.base_url, service);
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = REQUEST_TIMEOUT.min(remaining).max(MIN_REQUEST_TIMEOUT);

            let last_error = match self.http.get(&url).timeout(timeout).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let instances = resp.json::<Vec<Instance>>().await?;
                    if !instances.is_empty() {
                        return Ok(instances);
                    }
                    "no instances registered".to_string()
                }
                Ok(resp) => format!("unexpected status {}", resp.status()),
                Err(e) => e.to_string(),
            };

            if Instant::now() >= deadline {
                return Err(DeployError::DiscoveryError(format!(
                    "timed out waiting for {} instances: {}",
                    service, last_error
                )));
            }
            warn!("Waiting for {} in service discovery: {}", service, last_error);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Picks the controller URL and auth key from discovered instances.
pub fn controller_endpoint(instances: &[Instance]) -> Result<(String, String)> {
    let instance = instances
        .first()
        .ok_or_else(|| DeployError::DiscoveryError("no controller instances".to_string()))?;
    let key = instance
        .meta
        .get(AUTH_KEY_META)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            DeployError::DiscoveryError(format!(
                "controller instance {} has no {} metadata",
                instance.addr, AUTH_KEY_META
            ))
        })?;
    let url = if instance.addr.contains("://") {
        instance.addr.clone()
    } else {
        format!("http://{}", instance.addr)
    };
    Ok((url, key.clone()))
}

/// Builds the controller client, from explicit settings when present and
/// otherwise through service discovery.
pub async fn connect_controller(config: &Config) -> Result<ControllerClient> {
    if let (Some(url), Some(key)) = (&config.controller_url, &config.controller_key) {
        return ControllerClient::new(url.clone(), key.clone());
    }

    info!(
        "Looking up {} in service discovery at {}",
        config.controller_service, config.discovery_url
    );
    let instances = Discovery::new(config.discovery_url.clone())?
        .instances(&config.controller_service, config.discovery_wait)
        .await?;
    let (url, key) = controller_endpoint(&instances)?;
    ControllerClient::new(url, key)
}
