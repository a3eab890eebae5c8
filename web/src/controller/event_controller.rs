use crate::controller::ApiResponse;
use crate::params::event::NotifyParams;
use crate::{error::Error, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;

/// POST queue an event for every device of a user, or for one of them
///
/// Answers 202 once the event is queued and 503 when the queue is full.
pub async fn notify(
    State(app_state): State<AppState>,
    Json(params): Json<NotifyParams>,
) -> Result<impl IntoResponse, Error> {
    let (user_id, device_id, event) = params.into_event();
    debug!(
        "Queueing {} for user {user_id}, device {device_id:?}",
        event.event_type()
    );

    app_state
        .router
        .notify(&user_id, device_id.as_deref(), event)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    ))
}
