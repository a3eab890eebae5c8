//! Expiry-aware key/value storage.
//!
//! An [`ExpiringCache`] maps string keys to string values, each with an
//! optional expiry instant. Besides plain reads and writes it exposes the
//! atomic primitives the delivery pipeline relies on:
//!
//! - [`ExpiringCache::set_or_fail`]: insert only if no live entry exists
//! - [`ExpiringCache::get_and_delete`]: read and remove in one step
//! - [`ExpiringCache::drain`]: snapshot and clear the whole table in one step
//!
//! Two backends implement the trait: [`Memory`] keeps a table in process and
//! [`Redis`] keeps one hash per cache instance on a Redis server. A
//! [`Factory`] picks the backend from a URL.

use async_trait::async_trait;
use std::collections::HashMap;

pub mod error;
pub mod factory;
pub mod memory;
pub mod options;
pub mod remote;

pub use error::{Error, ErrorKind};
pub use factory::Factory;
pub use memory::Memory;
pub use options::SetOptions;
pub use remote::Redis;

/// A TTL-aware key/value store. All operations are safe for concurrent callers.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    /// Inserts or overwrites `key`.
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error>;

    /// Like [`ExpiringCache::set`], but fails with `KeyExists` if a live entry
    /// for `key` is present. Among concurrent callers on one key exactly one wins.
    async fn set_or_fail(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error>;

    /// Returns the value for `key`.
    ///
    /// Fails with `KeyNotFound` if absent and `KeyExpired` if present but past
    /// its expiry. An expired entry is left in place.
    async fn get(&self, key: &str) -> Result<String, Error>;

    /// Like [`ExpiringCache::get`], but removes the entry in the same step.
    async fn get_and_delete(&self, key: &str) -> Result<String, Error>;

    /// Removes `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Removes every expired entry.
    async fn cleanup(&self) -> Result<(), Error>;

    /// Removes expired entries, then takes every remaining entry out of the
    /// cache and returns it. Concurrent drains never return the same entry twice.
    async fn drain(&self) -> Result<HashMap<String, String>, Error>;
}
