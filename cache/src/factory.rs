//! Backend selection from a cache URL.

use log::*;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use url::Url;

use crate::error::Error;
use crate::memory::Memory;
use crate::remote::Redis;
use crate::ExpiringCache;

const DEFAULT_URL: &str = "memory://";

enum Backend {
    Memory,
    Redis(ConnectionManager),
}

/// Creates named cache instances on the backend chosen by URL.
///
/// `memory://` gives every instance its own in-process table.
/// `redis://` and `rediss://` instances share one connection and are kept
/// apart by hash key.
pub struct Factory {
    backend: Backend,
}

impl Factory {
    pub async fn new(url: &str) -> Result<Self, Error> {
        let url = if url.is_empty() { DEFAULT_URL } else { url };
        let parsed = Url::parse(url)?;

        let backend = match parsed.scheme() {
            "memory" => Backend::Memory,
            "redis" | "rediss" => {
                let client = redis::Client::open(url)?;
                let connection = ConnectionManager::new(client).await?;
                Backend::Redis(connection)
            }
            scheme => return Err(Error::config(&format!("invalid cache scheme: {scheme}"))),
        };

        info!("Cache backend: {}", parsed.scheme());
        Ok(Self { backend })
    }

    /// A factory for in-process caches, with no URL to parse.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
        }
    }

    /// Creates the cache instance called `name`.
    pub fn create(&self, name: &str) -> Arc<dyn ExpiringCache> {
        match &self.backend {
            Backend::Memory => Arc::new(Memory::new(None)),
            Backend::Redis(connection) => Arc::new(Redis::new(connection.clone(), name, None)),
        }
    }
}
