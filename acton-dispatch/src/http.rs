//! Axum integration.
//!
//! Maps admission errors onto HTTP responses and provides `/health` and
//! `/metrics` routes for a dispatcher-backed service.

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::deliver::Deliver;
use crate::dispatcher::Dispatcher;
use crate::error::SubmitError;
use crate::job::JobId;
use crate::metrics::MetricsSnapshot;
use crate::shutdown::ShutdownState;

/// JSON body returned for rejected submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorBody {
    /// Build an error body.
    #[must_use]
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// JSON body returned for accepted submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    /// Correlation ID of the queued job.
    pub job_id: JobId,
}

/// `202 Accepted` response for a queued job.
#[must_use]
pub fn accepted(job_id: JobId) -> Response {
    (StatusCode::ACCEPTED, Json(Accepted { job_id })).into_response()
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::QueueFull { .. } => (StatusCode::SERVICE_UNAVAILABLE, "queue_full"),
            Self::Closed => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
            Self::InvalidJob(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_job"),
        };

        let mut response = (status, Json(ErrorBody::new(code, self.to_string()))).into_response();
        if matches!(self, Self::QueueFull { .. }) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Health check body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Dispatcher name.
    pub dispatcher: String,
    /// Shutdown state.
    pub state: ShutdownState,
}

/// `/health` and `/metrics` routes for a dispatcher.
///
/// Merge into a service router that uses `Dispatcher<D>` as its state.
pub fn routes<D: Deliver>() -> Router<Dispatcher<D>> {
    Router::new()
        .route("/health", get(health::<D>))
        .route("/metrics", get(metrics::<D>))
}

async fn health<D: Deliver>(State(dispatcher): State<Dispatcher<D>>) -> impl IntoResponse {
    let state = dispatcher.state();
    let status = if state == ShutdownState::Open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(Health {
            dispatcher: dispatcher.name().to_string(),
            state,
        }),
    )
}

async fn metrics<D: Deliver>(State(dispatcher): State<Dispatcher<D>>) -> Json<MetricsSnapshot> {
    Json(dispatcher.metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::deliver::deliver_fn;
    use crate::job::Job;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::io;
    use std::time::Duration;
    use tower::ServiceExt;

    fn dispatcher() -> Dispatcher<impl Deliver<Payload = (), Error = io::Error>> {
        Dispatcher::new(
            "test",
            DispatcherConfig::default().with_queue_capacity(1),
            deliver_fn(|_job: Job<()>| async { Ok::<(), io::Error>(()) }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_queue_full_maps_to_503_with_retry_after() {
        let response = SubmitError::QueueFull { capacity: 1 }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "queue_full");
    }

    #[tokio::test]
    async fn test_invalid_job_maps_to_422() {
        let response = SubmitError::InvalidJob("no recipients".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_health_reflects_shutdown() {
        let dispatcher = dispatcher();
        let app = routes().with_state(dispatcher.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Health = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.state, ShutdownState::Closed);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let dispatcher = dispatcher();
        dispatcher.submit_payload(()).unwrap();
        let app = routes().with_state(dispatcher);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let metrics: MetricsSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(metrics.submitted, 1);
        assert_eq!(metrics.queue_depth, 1);
    }
}
