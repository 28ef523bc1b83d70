//! Remote job execution on the cluster controller

pub mod attach;
pub mod controller;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use attach::{AttachClient, Frame};
pub use controller::ControllerClient;

/// A release of an application, as known by the controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub id: String,
}

/// An application registered with the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Bidirectional byte stream of an attached job
pub trait AttachIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AttachIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type AttachStream = Box<dyn AttachIo>;

/// The controller operations the webhook service relies on.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Current release of `app`
    async fn get_release(&self, app: &str) -> Result<Release>;

    /// Starts a job from `release_id` and attaches to its output.
    ///
    /// With `release_env` set the job inherits the release's environment.
    async fn run_attached(
        &self,
        app: &str,
        release_id: &str,
        args: Vec<String>,
        release_env: bool,
    ) -> Result<AttachStream>;

    async fn list_apps(&self) -> Result<Vec<App>>;
}
