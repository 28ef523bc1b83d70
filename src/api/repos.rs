//! Mapping admin endpoints used by the web UI

use axum::{
    Form, Json,
    extract::State as AxumState,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, info};

use crate::SharedState;
use crate::error::DeployError;
use crate::mapping::NewMapping;

/// GET /repos.json - All repository mappings
pub async fn get_repos(AxumState(state): AxumState<SharedState>) -> Response {
    match state.mappings.list().await {
        Ok(repos) => Json(repos).into_response(),
        Err(e) => {
            error!("Error getting repos: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error getting repos").into_response()
        }
    }
}

/// POST /repos - Create a mapping from a form submission, then back to the UI
pub async fn create_repo(
    AxumState(state): AxumState<SharedState>,
    Form(new_repo): Form<NewMapping>,
) -> Response {
    if !new_repo.is_complete() {
        return (StatusCode::BAD_REQUEST, "both name and app are required").into_response();
    }

    match state.mappings.create(new_repo).await {
        Ok(repo) => {
            info!(
                "Added repo '{}' ({} branch) -> app {}",
                repo.name, repo.branch, repo.app
            );
            (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
        }
        Err(e @ DeployError::DuplicateMapping { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ DeployError::ReadOnlyStore(_)) => {
            info!("Rejected repo creation: {}", e);
            (StatusCode::METHOD_NOT_ALLOWED, e.to_string()).into_response()
        }
        Err(e) => {
            error!("Error adding repo: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error adding repo").into_response()
        }
    }
}

/// GET /apps.json - Apps known to the controller
pub async fn get_apps(AxumState(state): AxumState<SharedState>) -> Response {
    match state.runner.list_apps().await {
        Ok(apps) => Json(json!(apps)).into_response(),
        Err(e) => {
            error!("Error getting apps: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error getting apps").into_response()
        }
    }
}
