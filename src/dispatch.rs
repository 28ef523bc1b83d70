//! Deploy dispatch: runs the deployer job for an accepted push in the background

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::runner::{AttachClient, JobRunner};
use crate::webhook::PushTarget;

const DEFAULT_DEPLOYER_APP: &str = "taffy";
const DEFAULT_DEPLOYER_CMD: &str = "/bin/taffy";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Application whose release runs the deploys
    pub deployer_app: String,
    /// Command run inside the deployer job, followed by the deploy arguments
    pub deployer_cmd: String,
    /// Cap on deploys running at once. Unbounded unless set.
    pub max_concurrent: Option<usize>,
    /// Run deploys of the same application one after another
    pub serialize_per_app: bool,
    /// Bound on streaming a job's output until it exits
    pub attach_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            deployer_app: DEFAULT_DEPLOYER_APP.to_string(),
            deployer_cmd: DEFAULT_DEPLOYER_CMD.to_string(),
            max_concurrent: None,
            serialize_per_app: false,
            attach_timeout: None,
        }
    }
}

/// One deploy of `app_id` from a pushed commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    /// Correlates the log lines of a single dispatch
    pub id: Uuid,
    pub app_id: String,
    pub source_url: String,
    pub branch: String,
    pub commit_id: String,
}

impl DeployRequest {
    pub fn new(app_id: String, target: PushTarget) -> Self {
        Self {
            id: Uuid::now_v7(),
            app_id,
            source_url: target.clone_url,
            branch: target.branch,
            commit_id: target.commit_id,
        }
    }

    /// Deployer command line: `cmd app url branch commit`
    pub fn args(&self, deployer_cmd: &str) -> Vec<String> {
        vec![
            deployer_cmd.to_string(),
            self.app_id.clone(),
            self.source_url.clone(),
            self.branch.clone(),
            self.commit_id.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    Succeeded,
    Failed { exit_code: i32 },
    /// The deploy could not be run or observed to completion
    Errored(String),
}

/// Launches deploy jobs on the job runner, detached from the webhook request.
pub struct Dispatcher {
    runner: Arc<dyn JobRunner>,
    config: DispatchConfig,
    permits: Option<Arc<Semaphore>>,
    app_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    launched: AtomicUsize,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn JobRunner>, config: DispatchConfig) -> Self {
        let permits = config
            .max_concurrent
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        if permits.is_some() && config.attach_timeout.is_none() {
            warn!("Deploys are capped without a timeout; a hung job keeps its slot");
        }
        Self {
            runner,
            config,
            permits,
            app_locks: Mutex::new(HashMap::new()),
            launched: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of deploys launched since startup
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::Relaxed)
    }

    /// Spawns the deploy and returns immediately. Job output goes to the
    /// process's stdout/stderr; the outcome is logged by the task itself.
    pub fn dispatch(self: &Arc<Self>, request: DeployRequest) -> JoinHandle<DeployOutcome> {
        self.launched.fetch_add(1, Ordering::Relaxed);
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            dispatcher
                .run_with_output(&request, &mut stdout, &mut stderr)
                .await
        })
    }

    fn app_lock(&self, app_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.app_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(app_id.to_string()).or_default())
    }

    /// Runs one deploy to completion, writing job output to the given sinks.
    pub async fn run_with_output<O, E>(
        &self,
        request: &DeployRequest,
        stdout: &mut O,
        stderr: &mut E,
    ) -> DeployOutcome
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        // Queue on the app lock before taking a slot, so a backlog for one
        // app never holds slots other apps could run in
        let app_lock = self
            .config
            .serialize_per_app
            .then(|| self.app_lock(&request.app_id));
        let _app_guard = match &app_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let _permit = match &self.permits {
            Some(permits) => match Arc::clone(permits).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return DeployOutcome::Errored("dispatcher is shut down".to_string()),
            },
            None => None,
        };

        info!(
            dispatch_id = %request.id,
            "Deploying app: {}, url: {}, branch: {}, commit: {}",
            request.app_id, request.source_url, request.branch, request.commit_id
        );

        let outcome = match self.execute(request, stdout, stderr).await {
            Ok(0) => DeployOutcome::Succeeded,
            Ok(exit_code) => DeployOutcome::Failed { exit_code },
            Err(e) => DeployOutcome::Errored(e.to_string()),
        };

        match &outcome {
            DeployOutcome::Succeeded => {
                info!(dispatch_id = %request.id, "Deploy of {} complete", request.app_id)
            }
            DeployOutcome::Failed { exit_code } => error!(
                dispatch_id = %request.id,
                "Deploy of {} failed with exit status {}", request.app_id, exit_code
            ),
            DeployOutcome::Errored(reason) => error!(
                dispatch_id = %request.id,
                "Error running deploy job for {}: {}", request.app_id, reason
            ),
        }
        outcome
    }

    async fn execute<O, E>(
        &self,
        request: &DeployRequest,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<i32>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let deployer = &self.config.deployer_app;
        let release = self.runner.get_release(deployer).await.inspect_err(|e| {
            warn!(dispatch_id = %request.id, "Error getting {} release: {}", deployer, e)
        })?;

        let stream = self
            .runner
            .run_attached(
                deployer,
                &release.id,
                request.args(&self.config.deployer_cmd),
                true,
            )
            .await?;

        let mut attach = AttachClient::new(stream);
        match self.config.attach_timeout {
            Some(limit) => tokio::time::timeout(limit, attach.receive(stdout, stderr))
                .await
                .map_err(|_| DeployError::Timeout(limit))?,
            None => attach.receive(stdout, stderr).await,
        }
    }
}
