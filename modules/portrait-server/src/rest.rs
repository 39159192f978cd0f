use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use portrait_engine::{PortraitEngine, PortraitError};

pub struct AppState {
    pub engine: PortraitEngine,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    keep: Option<Vec<String>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/people/{identity}/image", get(api_resolve))
        .route("/api/people/{identity}/reconcile", post(api_reconcile))
        .route("/api/people/{identity}/cleanup", post(api_cleanup))
        .route("/api/people/{identity}/placeholder", post(api_placeholder))
        .route("/api/cleanup", post(api_batch_cleanup))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

pub async fn api_resolve(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Response {
    match state.engine.resolve(&identity).await {
        Ok(resolution) => Json(resolution).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_reconcile(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Response {
    match state.engine.reconcile(&identity).await {
        Ok(reconciliation) => Json(reconciliation).into_response(),
        Err(e) => error_response(e),
    }
}

/// The body is optional; an empty one means "keep the default set".
pub async fn api_cleanup(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    body: Bytes,
) -> Response {
    let request: CleanupRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("Invalid request body: {e}")})),
                )
                    .into_response();
            }
        }
    };

    match state.engine.cleanup(&identity, request.keep.as_deref()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_placeholder(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Response {
    match state.engine.create_placeholder(&identity).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_batch_cleanup(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.batch_cleanup().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

/// Hard failures are upstream trouble (store or storage), so 502. Callers
/// fall back to rendering initials.
fn error_response(e: PortraitError) -> Response {
    let status = match e {
        PortraitError::BlankIdentity => StatusCode::BAD_REQUEST,
        PortraitError::ResolutionFailed { .. } | PortraitError::Enumeration(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %e, status = status.as_u16(), "Request failed");
    (status, Json(serde_json::json!({"error": e.to_string()}))).into_response()
}
