pub mod api;
pub mod config;
pub mod db;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod runner;
pub mod signature;
pub mod ui;
pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use dispatch::Dispatcher;
use mapping::MappingStore;
use runner::JobRunner;
use signature::SignatureVerifier;

pub struct AppState {
    pub verifier: SignatureVerifier,
    pub mappings: Arc<dyn MappingStore>,
    pub runner: Arc<dyn JobRunner>,
    pub dispatcher: Arc<Dispatcher>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        verifier: SignatureVerifier,
        mappings: Arc<dyn MappingStore>,
        runner: Arc<dyn JobRunner>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            verifier,
            mappings,
            runner,
            dispatcher,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// GitHub caps webhook payloads at 25 MB; axum's default limit is 2 MB.
pub const MAX_WEBHOOK_BODY: usize = 25 * 1024 * 1024;

/// Builds the HTTP router: the webhook receiver plus the mapping admin pages.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/",
            routing::get(ui::serve_index)
                .post(api::handle_webhook)
                .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY)),
        )
        .route(
            "/webhook",
            routing::post(api::handle_webhook).layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY)),
        )
        .route("/assets/{*path}", routing::get(ui::serve_asset))
        .route("/repos.json", routing::get(api::get_repos))
        .route("/repos", routing::post(api::create_repo))
        .route("/apps.json", routing::get(api::get_apps))
        .route("/status", routing::get(api::status))
        .with_state(state)
}
