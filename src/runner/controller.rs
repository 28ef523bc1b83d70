//! HTTP client for the cluster controller API

use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde::Serialize;
use tracing::{debug, info};

use super::{App, AttachStream, JobRunner, Release};
use crate::error::{DeployError, Result};

const ATTACH_MEDIA_TYPE: &str = "application/vnd.flynn.attach";
const ATTACH_PROTOCOL: &str = "flynn-attach/0";

#[derive(Debug, Serialize)]
struct NewJob<'a> {
    release: &'a str,
    release_env: bool,
    args: &'a [String],
}

/// Talks to the controller at `base_url`, authenticating with its auth key.
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
    auth_key: String,
}

impl ControllerClient {
    pub fn new(base_url: impl Into<String>, auth_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("deploy_webhook/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Using controller at {}", base_url);
        Ok(Self {
            http,
            base_url,
            auth_key: auth_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth("", Some(&self.auth_key))
    }

    /// Turns a non-success response into a `ControllerError` carrying the body.
    async fn check(operation: String, resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(DeployError::ControllerError {
            operation,
            message: format!("{}: {}", status, body.trim()),
        })
    }
}

#[async_trait]
impl JobRunner for ControllerClient {
    async fn get_release(&self, app: &str) -> Result<Release> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/apps/{}/release", app))
            .send()
            .await?;
        let resp = Self::check(format!("get release of {}", app), resp).await?;
        Ok(resp.json::<Release>().await?)
    }

    async fn run_attached(
        &self,
        app: &str,
        release_id: &str,
        args: Vec<String>,
        release_env: bool,
    ) -> Result<AttachStream> {
        debug!("Starting attached job on {} (release {}): {:?}", app, release_id, args);
        let resp = self
            .request(reqwest::Method::POST, &format!("/apps/{}/jobs", app))
            .header(header::ACCEPT, ATTACH_MEDIA_TYPE)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, ATTACH_PROTOCOL)
            .json(&NewJob {
                release: release_id,
                release_env,
                args: &args,
            })
            .send()
            .await?;

        if resp.status() != StatusCode::SWITCHING_PROTOCOLS {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeployError::ControllerError {
                operation: format!("run job on {}", app),
                message: format!("expected 101 Switching Protocols, got {}: {}", status, body.trim()),
            });
        }

        let upgraded = resp.upgrade().await?;
        Ok(Box::new(upgraded))
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        let resp = self.request(reqwest::Method::GET, "/apps").send().await?;
        let resp = Self::check("list apps".to_string(), resp).await?;
        Ok(resp.json::<Vec<App>>().await?)
    }
}
