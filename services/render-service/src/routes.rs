//! HTTP intake for render jobs.

use acton_dispatch::http::{self, accepted};
use acton_dispatch::{Dispatcher, Job};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::services::{HttpRenderer, RenderJob};

/// Request body for `POST /v1/render`.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    /// Caller-supplied correlation ID; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// The document to render.
    #[serde(flatten)]
    pub render: RenderJob,
}

/// Build the service router.
pub fn router(dispatcher: Dispatcher<HttpRenderer>) -> Router {
    Router::new()
        .route("/v1/render", post(submit_render))
        .merge(http::routes::<HttpRenderer>())
        .with_state(dispatcher)
}

async fn submit_render(
    State(dispatcher): State<Dispatcher<HttpRenderer>>,
    Json(request): Json<RenderRequest>,
) -> Response {
    let job = match request.id {
        Some(id) => Job::with_id(id, request.render),
        None => Job::new(request.render),
    };

    match dispatcher.submit(job) {
        Ok(job_id) => accepted(job_id),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use acton_dispatch::http::{Accepted, ErrorBody};
    use acton_dispatch::DispatcherConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn dispatcher(dir: &std::path::Path, capacity: usize) -> Dispatcher<HttpRenderer> {
        let renderer = HttpRenderer::new(&RendererConfig {
            endpoint: "http://localhost:3000/render".to_string(),
            output_dir: dir.to_path_buf(),
            timeout_secs: 5,
            api_key: None,
        })
        .await
        .unwrap();
        Dispatcher::new(
            "render",
            DispatcherConfig::default().with_queue_capacity(capacity),
            renderer,
        )
        .unwrap()
    }

    fn request(body: serde_json::Value) -> Request<Body> {
        Request::post("/v1/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path(), 10).await;
        let app = router(dispatcher.clone());

        let response = app
            .oneshot(request(serde_json::json!({
                "template": "invoice",
                "data": { "number": 17 },
                "output": "invoice-17.pdf"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let accepted: Accepted = serde_json::from_slice(&body).unwrap();
        assert!(!accepted.job_id.is_empty());
        assert_eq!(dispatcher.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_path_in_output_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dispatcher(dir.path(), 10).await);

        let response = app
            .oneshot(request(serde_json::json!({
                "template": "invoice",
                "output": "../../etc/cron.d/job"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "invalid_job");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dispatcher(dir.path(), 10).await);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
