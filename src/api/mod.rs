//! API module for all HTTP handlers
//!
//! Contains the webhook receiver and the small admin API behind the UI

pub mod repos;
pub mod stats;
pub mod webhook;

// Re-export handlers
pub use repos::{create_repo, get_apps, get_repos};
pub use stats::status;
pub use webhook::handle_webhook;

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::Response;
    use std::sync::Arc;

    use crate::dispatch::{DispatchConfig, Dispatcher};
    use crate::mapping::StaticMappingStore;
    use crate::runner::fake::FakeRunner;
    use crate::signature::SignatureVerifier;
    use crate::{AppState, SharedState, router};

    pub const SECRET: &str = "topsecret";

    pub const MAPPINGS: &str = r#"
        [[repo]]
        name = "acme/widget"
        branch = "main"
        app = "app-42"
    "#;

    pub fn app_with(runner: FakeRunner, mappings: &str) -> (Router, SharedState, Arc<FakeRunner>) {
        let runner = Arc::new(runner);
        let dispatcher = Arc::new(Dispatcher::new(runner.clone(), DispatchConfig::default()));
        let state = Arc::new(AppState::new(
            SignatureVerifier::new(SECRET).unwrap(),
            Arc::new(StaticMappingStore::from_toml_str(mappings).unwrap()),
            runner.clone(),
            dispatcher,
        ));
        (router(state.clone()), state, runner)
    }

    pub async fn body_string(resp: Response<Body>) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
