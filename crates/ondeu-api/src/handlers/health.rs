use axum::response::IntoResponse;
use axum::Json;

/// Liveness probe. Does not touch any backend.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "Up",
    }))
}
