use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use log::*;
use prometheus::{Encoder, TextEncoder};
use service::AppState;

/// GET every registered collector in the Prometheus text format
pub async fn render(State(app_state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&app_state.registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
