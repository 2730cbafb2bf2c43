use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokenviz::TokenVisualization;

/// Request body of `POST /api/visualize`
#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    /// Prompt to visualize. Missing is treated like empty.
    #[serde(default)]
    pub input_text: Option<String>,
}

/// Response body of `POST /api/visualize`
#[derive(Debug, Serialize)]
pub struct VisualizeResponse {
    /// Input tokens first, then the generated reply's tokens.
    pub tokens: Vec<TokenVisualization>,
}

/// Generate a reply to `input_text` and place every token of both in 3D.
///
/// Whitespace-only `input_text` is rejected like a missing one (400), unlike
/// a plain emptiness check that would send `"   "` through the model. The
/// pipeline runs on its own task and always completes, even when the client
/// has already received a 408.
///
/// # Example
/// ```json
/// // Request
/// { "input_text": "Hello" }
///
/// // Response
/// {
///   "tokens": [
///     { "token": "Hello", "destination": [0.41, -1.0, 0.2], "is_input": true },
///     { "token": " there", "destination": [-0.7, 0.3, 1.0], "is_input": false }
///   ]
/// }
/// ```
pub async fn visualize(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<VisualizeRequest>, JsonRejection>,
) -> ServerResult<Json<VisualizeResponse>> {
    let Json(request) = payload
        .map_err(|rejection| ServerError::from_rejection(rejection, state.config.max_body_size_mb))?;

    let input_text = request.input_text.unwrap_or_default();
    if input_text.trim().is_empty() {
        return Err(ServerError::BadRequest("input_text is required".into()));
    }

    let chars = input_text.chars().count();
    let limit = state.config.max_input_chars;
    if chars > limit {
        return Err(ServerError::BadRequest(format!(
            "input_text is too long ({chars} characters, max {limit})"
        )));
    }

    let models = Arc::clone(&state.models);
    let pipeline = Arc::clone(&state.pipeline);
    let vis = tokio::spawn(async move {
        tokenviz::visualize(&models, &input_text, &pipeline.generation).await
    })
    .await
    .map_err(|e| ServerError::Internal(format!("visualization task failed: {e}")))??;

    Ok(Json(VisualizeResponse { tokens: vis.tokens }))
}
