//! Server status endpoint

use axum::{Json, extract::State as AxumState};
use serde_json::{Value, json};

use crate::SharedState;

/// GET /status - Server health and dispatch counters
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<Value> {
    let dispatch = state.dispatcher.config();
    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "deploys": {
            "launched": state.dispatcher.launched(),
            "deployer_app": dispatch.deployer_app,
            "max_concurrent": dispatch.max_concurrent,
            "serialize_per_app": dispatch.serialize_per_app,
        },
        "status": "healthy"
    }))
}
