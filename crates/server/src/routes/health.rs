use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use embed::ModelStatus;
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint (liveness)
/// Always 200 while the process serves requests; model state is informational.
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.models.status();

    let mut body = json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": status == ModelStatus::Ready,
        "model_status": status.as_str(),
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let ModelStatus::Failed(reason) = &status {
        body["model_error"] = json!(reason);
    }
    if let Some(info) = embed::model_file_info(&state.pipeline.engine) {
        body["model"] = json!(info);
    }
    if let Some(engine) = state.models.engine_info() {
        body["engine"] = json!(engine);
    }

    Json(body)
}

/// Readiness check endpoint
/// 200 once the model is loaded, 503 before that or after a failed load.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.models.status();
    let (code, label) = if status == ModelStatus::Ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        code,
        Json(json!({
            "status": label,
            "service": state.config.service_name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": state.uptime_seconds(),
            "components": {
                "api": "ready",
                "model": status.as_str(),
            }
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let handle = state.metrics.as_ref().ok_or(ServerError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
