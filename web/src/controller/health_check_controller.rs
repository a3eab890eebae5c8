use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET liveness of the HTTP surface
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
