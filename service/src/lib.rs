use cache::Factory;
use config::{Config, PushMode};
use events::DeviceDirectory;
use log::info;
use online::OnlineTracker;
use prometheus::Registry;
use push::{Dispatcher, PushTransport, Upstream};
use router::EventRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sse::Hub;
use std::sync::Arc;
use tokio::time::Duration;

pub mod config;
pub mod devices;
pub mod error;
pub mod logging;

pub use error::{Error, ErrorKind};

const PUSH_CACHE: &str = "push";
const PUSH_BLACKLIST_CACHE: &str = "push:blacklist";
const ONLINE_CACHE: &str = "online";

pub async fn init_database(config: &Config) -> Result<DatabaseConnection, DbErr> {
    info!(
        "Database pool config: max_connections={}, min_connections={}, \
         connect_timeout={}s, acquire_timeout={}s, idle_timeout={}s, max_lifetime={}s",
        config.db_max_connections,
        config.db_min_connections,
        config.db_connect_timeout_secs,
        config.db_acquire_timeout_secs,
        config.db_idle_timeout_secs,
        config.db_max_lifetime_secs,
    );

    let mut opt = ConnectOptions::new::<&str>(config.database_url());
    opt.max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(config.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime_secs))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    Ok(db)
}

/// Builds the push transport selected by `push_mode`, if any.
pub fn init_push_transport(config: &Config) -> Result<Option<Arc<dyn PushTransport>>, Error> {
    match config.push_mode {
        PushMode::Upstream => {
            let upstream = Upstream::new(
                config.push_upstream_url(),
                Duration::from_secs(config.push_timeout_secs.max(1)),
            )?;
            Ok(Some(Arc::new(upstream)))
        }
        PushMode::Disabled => {
            info!("Push delivery is disabled");
            Ok(None)
        }
    }
}

// Shared delivery pipeline handed to the web layer and the background tasks.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: Arc<Hub>,
    pub router: Arc<EventRouter>,
    pub push: Option<Arc<Dispatcher>>,
    pub transport: Option<Arc<dyn PushTransport>>,
    pub online: Arc<OnlineTracker>,
    pub registry: Registry,
}

impl AppState {
    /// Wires the pipeline on top of the `devices` table.
    pub async fn new(app_config: Config, db: &Arc<DatabaseConnection>) -> Result<Self, Error> {
        let directory = Arc::new(devices::SqlDeviceDirectory::new(Arc::clone(db)));
        let caches = Factory::new(app_config.cache_url()).await?;
        let transport = init_push_transport(&app_config)?;

        Self::with_parts(app_config, directory, &caches, transport)
    }

    /// Wires the pipeline from already built collaborators.
    pub fn with_parts(
        app_config: Config,
        directory: Arc<dyn DeviceDirectory>,
        caches: &Factory,
        transport: Option<Arc<dyn PushTransport>>,
    ) -> Result<Self, Error> {
        let hub = Arc::new(Hub::new(app_config.hub_config()));

        let push = transport.as_ref().map(|transport| {
            Arc::new(Dispatcher::new(
                app_config.push_config(),
                Arc::clone(transport),
                caches.create(PUSH_CACHE),
                caches.create(PUSH_BLACKLIST_CACHE),
            ))
        });

        let router = Arc::new(EventRouter::new(
            app_config.router_config(),
            Arc::clone(&directory),
            push.clone(),
            Arc::clone(&hub),
        ));

        let online = Arc::new(OnlineTracker::new(
            app_config.online_config(),
            caches.create(ONLINE_CACHE),
            directory,
        ));

        let registry = Registry::new();
        hub.metrics().register(&registry)?;
        router.metrics().register(&registry)?;
        online.metrics().register(&registry)?;
        if let Some(push) = &push {
            push.metrics().register(&registry)?;
        }

        Ok(Self {
            config: app_config,
            hub,
            router,
            push,
            transport,
            online,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use clap::Parser;
    use std::collections::HashMap;

    struct EmptyDirectory;

    #[async_trait]
    impl DeviceDirectory for EmptyDirectory {
        async fn select(
            &self,
            _user_id: &str,
            _device_id: Option<&str>,
        ) -> Result<Vec<events::Device>, events::Error> {
            Ok(Vec::new())
        }

        async fn set_last_seen(
            &self,
            _last_seen: HashMap<String, DateTime<Utc>>,
        ) -> Result<(), events::Error> {
            Ok(())
        }
    }

    fn config(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("sms-notify").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn disabled_push_mode_builds_no_dispatcher() {
        let config = config(&["--push-mode", "disabled"]);
        let transport = init_push_transport(&config).unwrap();
        assert!(transport.is_none());

        let state =
            AppState::with_parts(config, Arc::new(EmptyDirectory), &Factory::memory(), transport)
                .unwrap();

        assert!(state.push.is_none());
        let families = state.registry.gather();
        assert!(families
            .iter()
            .all(|family| !family.get_name().starts_with("sms_push_")));
    }

    #[test]
    fn upstream_push_mode_registers_every_subsystem() {
        let config = config(&[]);
        let transport = init_push_transport(&config).unwrap();
        assert!(transport.is_some());

        let state =
            AppState::with_parts(config, Arc::new(EmptyDirectory), &Factory::memory(), transport)
                .unwrap();
        assert!(state.push.is_some());

        // Touch one labeled series per subsystem so every family is gathered.
        state
            .router
            .notify("u1", None, events::Event::message_enqueued())
            .unwrap();
        let names: Vec<String> = state
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"sms_sse_active_connections".to_string()));
        assert!(names.contains(&"sms_events_enqueued_total".to_string()));
        assert!(names.contains(&"sms_online_batch_size".to_string()));
        assert!(names.contains(&"sms_push_errors_total".to_string()));
    }
}
