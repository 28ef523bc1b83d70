//! Webhook handler for GitHub push events

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, error, info, warn};

use crate::SharedState;
use crate::dispatch::DeployRequest;
use crate::webhook::{Classification, EVENT_HEADER, SIGNATURE_HEADER, classify};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn bad_request(message: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message)
}

/// Handles the GitHub webhook POST request.
///
/// The body arrives as one buffer that feeds both signature verification and
/// payload decoding. Anything after mapping resolution happens in a detached
/// deploy task, so the response only reflects what could be checked up front.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    debug!("Handling webhook request ({} bytes)", body.len());

    let Some(event_type) = header_str(&headers, EVENT_HEADER) else {
        warn!("Request missing {} header", EVENT_HEADER);
        return bad_request(format!("missing {} header", EVENT_HEADER));
    };

    let Some(signature) = header_str(&headers, SIGNATURE_HEADER) else {
        warn!("Request missing {} header", SIGNATURE_HEADER);
        return bad_request(format!("missing {} header", SIGNATURE_HEADER));
    };

    if !state.verifier.verify(&body, signature) {
        warn!("Invalid {} header", SIGNATURE_HEADER);
        return bad_request(format!("invalid {} header", SIGNATURE_HEADER));
    }

    let target = match classify(Some(event_type), &body) {
        Classification::Rejected(message) => return bad_request(message),
        Classification::Acknowledged(reply) => return (StatusCode::OK, reply.to_string()),
        Classification::Dispatch(target) => target,
    };

    // Resolution problems are for the operator; GitHub always gets a 200
    let mapping = match state.mappings.get(&target.repository, &target.branch).await {
        Ok(Some(mapping)) => mapping,
        Ok(None) => {
            warn!(
                "No app mapped for repo '{}' and branch '{}', skipping.",
                target.repository, target.branch
            );
            return (StatusCode::OK, String::new());
        }
        Err(e) => {
            error!(
                "Error loading repo '{}' ({} branch): {}",
                target.repository, target.branch, e
            );
            return (StatusCode::OK, String::new());
        }
    };

    let request = DeployRequest::new(mapping.app, target);
    info!(
        dispatch_id = %request.id,
        "Dispatching deploy of {} for '{}' branch '{}'",
        request.app_id, mapping.name, request.branch
    );

    // Detached: the deploy task logs its own outcome
    drop(state.dispatcher.dispatch(request));

    (StatusCode::OK, String::new())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::api::test_support::{MAPPINGS, SECRET, app_with, body_string};
    use crate::runner::fake::FakeRunner;
    use crate::runner::{Frame, Release};
    use crate::signature::SignatureVerifier;

    const PUSH_BODY: &str = r#"{"ref":"refs/heads/main","deleted":false,"head_commit":{"id":"abc123"},"repository":{"full_name":"acme/widget","clone_url":"https://example.com/acme/widget.git"}}"#;

    fn sign(body: &str) -> String {
        SignatureVerifier::new(SECRET).unwrap().sign(body.as_bytes())
    }

    fn webhook(event: Option<&str>, signature: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(event) = event {
            builder = builder.header("X-GitHub-Event", event);
        }
        if let Some(signature) = signature {
            builder = builder.header("X-Hub-Signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn mapped_push_dispatches_exactly_once() {
        let (runner, mut rx) = FakeRunner::exiting(0);
        let (app, state, runner) = app_with(runner, MAPPINGS);

        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(PUSH_BODY)), PUSH_BODY))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.dispatcher.launched(), 1);

        let call = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.app, "taffy");
        assert_eq!(
            call.args[1..],
            [
                "app-42",
                "https://example.com/acme/widget.git",
                "main",
                "abc123"
            ]
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected_without_dispatch() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, runner) = app_with(runner, MAPPINGS);

        let mut signature = sign(PUSH_BODY);
        let last = signature.pop().unwrap();
        signature.push(if last == 'a' { 'b' } else { 'a' });

        let resp = app
            .oneshot(webhook(Some("push"), Some(&signature), PUSH_BODY))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "invalid X-Hub-Signature header");
        assert_eq!(state.dispatcher.launched(), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_headers_are_bad_requests() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, _) = app_with(runner, MAPPINGS);

        let resp = app
            .clone()
            .oneshot(webhook(None, Some(&sign(PUSH_BODY)), PUSH_BODY))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "missing X-GitHub-Event header");

        let resp = app
            .oneshot(webhook(Some("push"), None, PUSH_BODY))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "missing X-Hub-Signature header");
        assert_eq!(state.dispatcher.launched(), 0);
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, _, _) = app_with(runner, MAPPINGS);

        let body = r#"{"zen":"Keep it logically awesome.","hook_id":1}"#;
        let resp = app
            .oneshot(webhook(Some("ping"), Some(&sign(body)), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "pong");
    }

    #[tokio::test]
    async fn unknown_event_is_rejected_regardless_of_body() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, _) = app_with(runner, MAPPINGS);

        let resp = app
            .oneshot(webhook(Some("issue_comment"), Some(&sign(PUSH_BODY)), PUSH_BODY))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "unknown X-GitHub-Event: issue_comment");
        assert_eq!(state.dispatcher.launched(), 0);
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, _, _) = app_with(runner, MAPPINGS);

        let body = "{not json";
        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(body)), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "invalid JSON payload");
    }

    #[tokio::test]
    async fn deleted_branch_never_dispatches() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, runner) = app_with(runner, MAPPINGS);

        let body = r#"{"ref":"refs/heads/main","deleted":true,"head_commit":null,"repository":{"full_name":"acme/widget","clone_url":"https://example.com/acme/widget.git"}}"#;
        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(body)), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.dispatcher.launched(), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn unmapped_branch_is_a_silent_success() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, runner) = app_with(runner, MAPPINGS);

        let body = PUSH_BODY.replace("refs/heads/main", "refs/heads/feature");
        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(&body)), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "");
        assert_eq!(state.dispatcher.launched(), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn webhook_path_alias_accepts_pushes() {
        let (runner, mut rx) = FakeRunner::exiting(1);
        let (app, _, _) = app_with(runner, MAPPINGS);

        let mut req = webhook(Some("push"), Some(&sign(PUSH_BODY)), PUSH_BODY);
        *req.uri_mut() = "/webhook".parse().unwrap();
        let resp = app.oneshot(req).await.unwrap();

        // a failing deploy is still a 200 for the sender
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn large_push_is_accepted_and_dispatched() {
        let (runner, mut rx) = FakeRunner::exiting(0);
        let (app, state, _) = app_with(runner, MAPPINGS);

        // GitHub pushes with many commits easily exceed 2 MB
        let padding = "x".repeat(3 * 1024 * 1024);
        let body = PUSH_BODY.replacen('{', &format!(r#"{{"padding":"{}","#, padding), 1);
        assert!(body.len() > 3 * 1024 * 1024);

        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(&body)), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.dispatcher.launched(), 1);
        assert!(
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, state, _) = app_with(runner, MAPPINGS);

        let body = "x".repeat(crate::MAX_WEBHOOK_BODY + 1);
        let resp = app
            .oneshot(webhook(Some("push"), Some(&sign(&body)), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(state.dispatcher.launched(), 0);
    }

    #[tokio::test]
    async fn response_does_not_wait_for_running_deploy() {
        let (runner, mut rx) = FakeRunner::new(
            Some(Release {
                id: "rel-taffy".to_string(),
            }),
            vec![Frame::Stdout(b"-----> building\n".to_vec())],
        );
        let (app, state, _) = app_with(runner.hanging(), MAPPINGS);

        let resp = tokio::time::timeout(
            Duration::from_secs(1),
            app.oneshot(webhook(Some("push"), Some(&sign(PUSH_BODY)), PUSH_BODY)),
        )
        .await
        .expect("response waited on the deploy")
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.dispatcher.launched(), 1);

        // the job is attached and still running after the response went out
        let call = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.release_id, "rel-taffy");
    }
}
