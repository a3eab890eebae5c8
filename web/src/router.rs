use crate::{
    controller::{event_controller, health_check_controller, metrics_controller},
    sse, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(metrics_routes(app_state.clone()))
        .merge(mobile_event_routes(app_state.clone()))
        .merge(third_party_event_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn metrics_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_controller::render))
        .with_state(app_state)
}

fn mobile_event_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/mobile/v1/events/:device_id",
            get(sse::handler::event_stream),
        )
        .with_state(app_state)
}

fn third_party_event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/3rdparty/v1/events", post(event_controller::notify))
        .with_state(app_state)
}
