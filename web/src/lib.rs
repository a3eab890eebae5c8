//! HTTP surface of the notification pipeline.
//!
//! - `GET /mobile/v1/events/:device_id`: a device's event stream
//! - `POST /3rdparty/v1/events`: queue an event for a user's devices
//! - `GET /health` and `GET /metrics`

use log::*;
use service::AppState;
use std::future::Future;
use tokio::net::TcpListener;

pub(crate) mod controller;
pub mod error;
pub(crate) mod params;
pub mod router;
pub(crate) mod sse;

/// Serves the routes until `shutdown` resolves. Open event streams are
/// expected to be closed by the caller through the hub once it does.
pub async fn init_server(
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let server_url = format!("{}:{}", interface, app_state.config.port);

    let listener = TcpListener::bind(&server_url).await?;
    info!("Server starting... listening for connections on http://{server_url}");

    axum::serve(listener, crate::router::define_routes(app_state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
