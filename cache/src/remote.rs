//! Redis cache backend.
//!
//! Each cache instance owns a single hash. Item keys are hash fields and
//! expiry is per field (`HEXPIREAT`, Redis 7.4+), so the server removes
//! expired items on its own and `cleanup` has nothing to do.
//!
//! The conditional and destructive reads run as Lua scripts so that each one
//! is a single atomic step on the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::options::SetOptions;
use crate::ExpiringCache;

const HASH_KEY: &str = "cache";

// KEYS[1] hash, ARGV[1] field, ARGV[2] value, ARGV[3] unix expiry or 0.
// Insert and expiry happen in the same script so the field is never
// observable without its expiry.
const SET_IF_ABSENT_SCRIPT: &str = r#"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
  return 0
end
if ARGV[3] ~= '0' then
  redis.call('HEXPIREAT', KEYS[1], ARGV[3], 'FIELDS', 1, ARGV[1])
end
return 1
"#;

const GET_AND_DELETE_SCRIPT: &str = r#"
local value = redis.call('HGET', KEYS[1], ARGV[1])
if value then
  redis.call('HDEL', KEYS[1], ARGV[1])
  return value
end
return false
"#;

const DRAIN_SCRIPT: &str = r#"
local items = redis.call('HGETALL', KEYS[1])
if #items > 0 then
  redis.call('DEL', KEYS[1])
end
return items
"#;

/// Cache backed by one Redis hash.
pub struct Redis {
    connection: ConnectionManager,
    key: String,
    ttl: Option<Duration>,
    set_if_absent: Script,
    get_and_delete: Script,
    drain: Script,
}

impl Redis {
    /// Creates a cache stored under `<prefix>:cache`. `ttl` is the default
    /// expiry for writes that don't choose their own.
    pub fn new(connection: ConnectionManager, prefix: &str, ttl: Option<Duration>) -> Self {
        Self {
            connection,
            key: Self::hash_key(prefix),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            set_if_absent: Script::new(SET_IF_ABSENT_SCRIPT),
            get_and_delete: Script::new(GET_AND_DELETE_SCRIPT),
            drain: Script::new(DRAIN_SCRIPT),
        }
    }

    /// Name of the Redis hash holding this cache's items.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn hash_key(prefix: &str) -> String {
        if prefix.is_empty() {
            HASH_KEY.to_string()
        } else if prefix.ends_with(':') {
            format!("{prefix}{HASH_KEY}")
        } else {
            format!("{prefix}:{HASH_KEY}")
        }
    }

    /// Unix seconds for `HEXPIREAT`, rounded up so an item never outlives
    /// less than its requested lifetime.
    fn expiry_seconds(valid_until: DateTime<Utc>) -> i64 {
        let seconds = valid_until.timestamp();
        if valid_until.timestamp_subsec_nanos() > 0 {
            seconds + 1
        } else {
            seconds
        }
    }
}

#[async_trait]
impl ExpiringCache for Redis {
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let mut pipeline = redis::pipe();
        pipeline.atomic().hset(&self.key, key, value).ignore();

        match options.resolve(Utc::now(), self.ttl) {
            Some(valid_until) => pipeline
                .cmd("HEXPIREAT")
                .arg(&self.key)
                .arg(Self::expiry_seconds(valid_until))
                .arg("FIELDS")
                .arg(1)
                .arg(key)
                .ignore(),
            // Overwriting a field keeps its old TTL unless cleared.
            None => pipeline
                .cmd("HPERSIST")
                .arg(&self.key)
                .arg("FIELDS")
                .arg(1)
                .arg(key)
                .ignore(),
        };

        let _: () = pipeline.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_or_fail(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let expiry = options
            .resolve(Utc::now(), self.ttl)
            .map(Self::expiry_seconds)
            .unwrap_or(0);

        let inserted: i64 = self
            .set_if_absent
            .key(&self.key)
            .arg(key)
            .arg(value)
            .arg(expiry)
            .invoke_async(&mut conn)
            .await?;

        if inserted == 0 {
            return Err(Error::key_exists());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, Error> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.hget(&self.key, key).await?;
        value.ok_or_else(Error::key_not_found)
    }

    async fn get_and_delete(&self, key: &str) -> Result<String, Error> {
        let mut conn = self.connection.clone();
        let value: Option<String> = self
            .get_and_delete
            .key(&self.key)
            .arg(key)
            .invoke_async(&mut conn)
            .await?;
        value.ok_or_else(Error::key_not_found)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let _: () = conn.hdel(&self.key, key).await?;
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn drain(&self) -> Result<HashMap<String, String>, Error> {
        let mut conn = self.connection.clone();
        let items: HashMap<String, String> = self
            .drain
            .key(&self.key)
            .invoke_async(&mut conn)
            .await?;

        if !items.is_empty() {
            debug!("Drained {} item(s) from {}", items.len(), self.key);
        }
        Ok(items)
    }
}
