use deploy_webhook::config::Config;
use deploy_webhook::db::{SqlMappingStore, init_db};
use deploy_webhook::discovery::connect_controller;
use deploy_webhook::dispatch::Dispatcher;
use deploy_webhook::error::DeployError;
use deploy_webhook::logging::{FileLogger, setup_logging};
use deploy_webhook::mapping::{MappingStore, StaticMappingStore};
use deploy_webhook::runner::JobRunner;
use deploy_webhook::signature::SignatureVerifier;
use deploy_webhook::{AppState, router};
use std::sync::Arc;
use tracing::{error, info};

async fn run(config: Config) -> Result<(), DeployError> {
    // Fail fast on an unusable secret before touching anything remote
    let verifier = SignatureVerifier::new(&config.secret_token)?;

    let mappings: Arc<dyn MappingStore> = match &config.mappings_file {
        Some(path) => Arc::new(StaticMappingStore::load(path)?),
        None => Arc::new(SqlMappingStore::new(init_db(&config.database_path).await?)),
    };

    let runner: Arc<dyn JobRunner> = Arc::new(connect_controller(&config).await?);
    let dispatcher = Arc::new(Dispatcher::new(runner.clone(), config.dispatch.clone()));

    let state = Arc::new(AppState::new(verifier, mappings, runner, dispatcher));
    let app = router(state);

    let bind_address = config.bind_address();
    info!("Listening for GitHub webhooks on {}...", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let file_logger = config.log_dir.clone().map(FileLogger::new);
    let _log_guard = setup_logging(file_logger.as_ref());

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
