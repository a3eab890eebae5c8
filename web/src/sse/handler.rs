use crate::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use log::*;

/// Opens the event stream of `device_id`.
///
/// The connection is registered before the response is returned, and is
/// dropped from the hub as soon as the client goes away.
pub(crate) async fn event_stream(
    Path(device_id): Path<String>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    debug!("Establishing SSE connection for device {device_id}");

    app_state.online.set_online(&device_id).await;
    let subscription = app_state.hub.connect(&device_id);

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(subscription.into_stream()),
    )
}
