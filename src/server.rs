//! HTTP routing layer
//!
//! Maps query strings and headers onto [`CaptureEngine::capture`] and engine
//! errors onto status codes and JSON bodies.

use crate::{BrowserProvider, CaptureEngine, CaptureError, CaptureRequest};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub struct AppState<P: BrowserProvider> {
    pub engine: CaptureEngine<P>,
    /// Present only when metrics export is enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// Builds the service router.
///
/// Every path except `/` sits behind the bearer-token gate, unknown paths
/// included.
///
/// `access_log` adds one info line per request with method, path, status and
/// latency.
pub fn router<P: BrowserProvider>(state: Arc<AppState<P>>, access_log: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(health))
        .route("/screenshot", get(screenshot::<P>))
        .route("/metrics", get(render_metrics::<P>))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth::<P>))
        .with_state(state);

    if access_log {
        router = router.layer(middleware::from_fn(log_request));
    }
    router.layer(middleware::from_fn(cors))
}

/// Serves `router` on `port` until `shutdown` resolves.
pub async fn serve(
    router: Router,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Screenshot service is online on port {}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "online": true }))
}

async fn screenshot<P: BrowserProvider>(
    State(state): State<Arc<AppState<P>>>,
    headers: HeaderMap,
    query: Result<Query<CaptureRequest>, QueryRejection>,
) -> Response {
    let request = match query {
        Ok(Query(request)) => request,
        Err(rejection) => {
            let error = crate::ValidationError::form(rejection.body_text());
            crate::metrics::record_rejection("validation");
            return CaptureError::from(error).into_response();
        }
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.engine.capture(&request, authorization).await {
        Ok(result) => (
            [(header::CONTENT_TYPE, result.content_type())],
            result.data,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn render_metrics<P: BrowserProvider>(State(state): State<Arc<AppState<P>>>) -> Response {
    let Some(handle) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

async fn require_auth<P: BrowserProvider>(
    State(state): State<Arc<AppState<P>>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/" {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.engine.security().check_auth(authorization) {
        crate::metrics::record_rejection(e.kind());
        return e.into_response();
    }

    next.run(request).await
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        let mut preflight = Response::new(Body::empty());
        *preflight.status_mut() = StatusCode::NO_CONTENT;
        let headers = preflight.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,HEAD,PUT,POST,DELETE,PATCH"),
        );
        if let Some(requested) = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
        {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        }
        preflight
    } else {
        next.run(request).await
    };

    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self {
            CaptureError::Validation(errors) => json!({
                "error": "Invalid query parameters",
                "details": {
                    "formErrors": errors.form,
                    "fieldErrors": errors.field_errors(),
                }
            }),
            CaptureError::Unauthorized(_)
            | CaptureError::Forbidden(_)
            | CaptureError::HostNotAllowed { .. } => json!({ "error": self.to_string() }),
            CaptureError::ResourceExhausted { .. } => json!({
                "error": "Service unavailable",
                "message": self.to_string(),
            }),
            CaptureError::NavigationTimeout(_) | CaptureError::SelectorTimeout { .. } => json!({
                "error": "Screenshot timed out",
                "message": self.to_string(),
            }),
            _ => json!({
                "error": "Failed to capture screenshot",
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
