use axum::{
    body::Body,
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct UiAssets;

fn embedded(path: &str) -> Option<Response> {
    let content = UiAssets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some(
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref().to_string())],
            Body::from(content.data.into_owned()),
        )
            .into_response(),
    )
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// GET / - The mapping admin page
pub async fn serve_index() -> impl IntoResponse {
    embedded("index.html").unwrap_or_else(not_found)
}

/// GET /assets/{*path}
pub async fn serve_asset(Path(path): Path<String>) -> impl IntoResponse {
    embedded(path.trim_start_matches('/')).unwrap_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::api::test_support::{MAPPINGS, app_with};
    use crate::runner::fake::FakeRunner;

    async fn fetch(uri: &str) -> axum::response::Response {
        let (runner, _rx) = FakeRunner::exiting(0);
        let (app, _, _) = app_with(runner, MAPPINGS);
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn serves_index_and_assets() {
        let resp = fetch("/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));

        let resp = fetch("/assets/app.js").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = fetch("/assets/missing.css").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
