use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::error::Error;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::new();
    Logger::init_logger(&config)?;

    info!("Starting up notification gateway...");

    let db = Arc::new(service::init_database(&config).await?);
    let app_state = AppState::new(config, &db).await?;

    if let Some(transport) = &app_state.transport {
        transport.open().await?;
    }

    let cancel = CancellationToken::new();
    let tasks = spawn_background_tasks(&app_state, &cancel);

    let shutdown = {
        let cancel = cancel.clone();
        let hub = Arc::clone(&app_state.hub);
        async move {
            shutdown_signal().await;
            cancel.cancel();
            // Open streams would otherwise hold the graceful shutdown forever.
            hub.close();
        }
    };
    let served = web::init_server(app_state.clone(), shutdown).await;

    // Also reached when the listener fails to bind.
    cancel.cancel();
    app_state.hub.close();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task failed: {e}");
        }
    }

    if let Some(transport) = &app_state.transport {
        if let Err(e) = transport.close().await {
            warn!("Failed to close push transport: {e}");
        }
    }

    info!("Shutdown complete");
    Ok(served?)
}

fn spawn_background_tasks(app_state: &AppState, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    let router = Arc::clone(&app_state.router);
    let token = cancel.clone();
    tasks.push(tokio::spawn(async move { router.run(token).await }));

    if let Some(push) = &app_state.push {
        let push = Arc::clone(push);
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move { push.run(token).await }));
    }

    let online = Arc::clone(&app_state.online);
    let token = cancel.clone();
    tasks.push(tokio::spawn(async move { online.run(token).await }));

    tasks
}

/// Resolves on CTRL+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = wait_for_signal("CTRL+C", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = wait_for_signal("SIGTERM", async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        signal.recv().await;
        Ok::<(), io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Resolves when `signal` fires. A handler that can't be installed never
/// resolves, so the other signals still decide when to shut down.
async fn wait_for_signal<F>(name: &str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Received {name}, shutting down"),
        Err(e) => {
            error!("Failed to install {name} handler: {e}");
            std::future::pending::<()>().await
        }
    }
}
