//! In-process cache backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::options::SetOptions;
use crate::ExpiringCache;

#[derive(Debug, Clone)]
struct Item {
    value: String,
    valid_until: Option<DateTime<Utc>>,
}

impl Item {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|valid_until| now > valid_until)
    }
}

/// A cache table held in memory behind a single reader-preferring lock.
///
/// The lock is only ever held for table access, never across an `.await`.
pub struct Memory {
    items: RwLock<HashMap<String, Item>>,
    ttl: Option<Duration>,
}

impl Memory {
    /// Creates an empty cache. `ttl` is the default expiry for writes that
    /// don't choose their own; `None` or zero means entries never expire.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    /// Number of entries in the table, expired ones included.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn new_item(&self, value: &str, options: SetOptions, now: DateTime<Utc>) -> Item {
        Item {
            value: value.to_string(),
            valid_until: options.resolve(now, self.ttl),
        }
    }

    fn check(item: Option<Item>, now: DateTime<Utc>) -> Result<String, Error> {
        match item {
            None => Err(Error::key_not_found()),
            Some(item) if item.is_expired(now) => Err(Error::key_expired()),
            Some(item) => Ok(item.value),
        }
    }

    fn remove_expired(items: &mut HashMap<String, Item>, now: DateTime<Utc>) {
        items.retain(|_, item| !item.is_expired(now));
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ExpiringCache for Memory {
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error> {
        let item = self.new_item(value, options, Utc::now());
        self.items.write().insert(key.to_string(), item);
        Ok(())
    }

    async fn set_or_fail(&self, key: &str, value: &str, options: SetOptions) -> Result<(), Error> {
        let now = Utc::now();
        let mut items = self.items.write();

        if let Some(existing) = items.get(key) {
            if !existing.is_expired(now) {
                return Err(Error::key_exists());
            }
        }

        items.insert(key.to_string(), self.new_item(value, options, now));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, Error> {
        let item = self.items.read().get(key).cloned();
        Self::check(item, Utc::now())
    }

    async fn get_and_delete(&self, key: &str) -> Result<String, Error> {
        let item = self.items.write().remove(key);
        Self::check(item, Utc::now())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.items.write().remove(key);
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), Error> {
        let now = Utc::now();
        Self::remove_expired(&mut self.items.write(), now);
        Ok(())
    }

    async fn drain(&self) -> Result<HashMap<String, String>, Error> {
        let now = Utc::now();
        let snapshot = {
            let mut items = self.items.write();
            Self::remove_expired(&mut items, now);
            std::mem::take(&mut *items)
        };

        Ok(snapshot
            .into_iter()
            .map(|(key, item)| (key, item.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = Memory::default();
        cache.set("a", "1", SetOptions::default()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let cache = Memory::default();
        let err = cache.get("missing").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::KeyNotFound);
    }

    #[tokio::test]
    async fn get_after_ttl_elapses_is_expired_and_entry_remains() {
        let cache = Memory::default();
        cache
            .set("a", "1", SetOptions::with_ttl(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = cache.get("a").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::KeyExpired);
        // Get doesn't evict.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn default_ttl_applies_to_plain_set() {
        let cache = Memory::new(Some(Duration::from_millis(10)));
        cache.set("a", "1", SetOptions::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            cache.get("a").await.unwrap_err().error_kind,
            ErrorKind::KeyExpired
        );
    }

    #[tokio::test]
    async fn valid_until_in_the_past_is_expired_immediately() {
        let cache = Memory::default();
        let past = Utc::now() - chrono::Duration::seconds(1);
        cache
            .set("a", "1", SetOptions::with_valid_until(past))
            .await
            .unwrap();
        assert_eq!(
            cache.get("a").await.unwrap_err().error_kind,
            ErrorKind::KeyExpired
        );
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_expiry() {
        let cache = Memory::default();
        cache
            .set("a", "1", SetOptions::with_ttl(Duration::from_millis(10)))
            .await
            .unwrap();
        cache.set("a", "2", SetOptions::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.get("a").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn set_or_fail_rejects_live_key() {
        let cache = Memory::default();
        cache.set_or_fail("a", "1", SetOptions::default()).await.unwrap();

        let err = cache
            .set_or_fail("a", "2", SetOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::KeyExists);
        assert_eq!(cache.get("a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn set_or_fail_replaces_expired_key() {
        let cache = Memory::default();
        cache
            .set("a", "1", SetOptions::with_ttl(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        cache.set_or_fail("a", "2", SetOptions::default()).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), "2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_set_or_fail_has_exactly_one_winner() {
        let cache = Arc::new(Memory::default());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let mut wins = 0;
                let mut exists = 0;
                for _ in 0..100 {
                    match cache.set_or_fail("x", "v", SetOptions::default()).await {
                        Ok(()) => wins += 1,
                        Err(e) if e.error_kind == ErrorKind::KeyExists => exists += 1,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                (wins, exists)
            }));
        }

        let mut wins = 0;
        let mut exists = 0;
        for handle in handles {
            let (w, e) = handle.await.unwrap();
            wins += w;
            exists += e;
        }

        assert_eq!(wins, 1);
        assert_eq!(exists, 999);
    }

    #[tokio::test]
    async fn get_and_delete_removes_entry() {
        let cache = Memory::default();
        cache.set("a", "1", SetOptions::default()).await.unwrap();

        assert_eq!(cache.get_and_delete("a").await.unwrap(), "1");
        assert_eq!(
            cache.get("a").await.unwrap_err().error_kind,
            ErrorKind::KeyNotFound
        );
    }

    #[tokio::test]
    async fn get_and_delete_of_expired_entry_reports_expired_and_removes_it() {
        let cache = Memory::default();
        cache
            .set("a", "1", SetOptions::with_ttl(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(
            cache.get_and_delete("a").await.unwrap_err().error_kind,
            ErrorKind::KeyExpired
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = Memory::default();
        cache.set("a", "1", SetOptions::default()).await.unwrap();

        cache.delete("a").await.unwrap();
        cache.delete("a").await.unwrap();

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_entries() {
        let cache = Memory::default();
        cache
            .set("old", "1", SetOptions::with_ttl(Duration::from_millis(5)))
            .await
            .unwrap();
        cache.set("live", "2", SetOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        cache.cleanup().await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("old").await.unwrap_err().error_kind,
            ErrorKind::KeyNotFound
        );
        assert_eq!(cache.get("live").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn drain_skips_expired_and_leaves_table_empty() {
        let cache = Memory::default();
        cache
            .set("old", "1", SetOptions::with_ttl(Duration::from_millis(5)))
            .await
            .unwrap();
        cache.set("live", "2", SetOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        let drained = cache.drain().await.unwrap();

        assert_eq!(drained.len(), 1);
        assert_eq!(drained["live"], "2");
        assert!(cache.is_empty());
        assert_eq!(
            cache.get("old").await.unwrap_err().error_kind,
            ErrorKind::KeyNotFound
        );
    }

    #[tokio::test]
    async fn drain_of_empty_cache_is_empty() {
        let cache = Memory::default();
        assert!(cache.drain().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_drains_partition_the_table() {
        let cache = Arc::new(Memory::default());
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..2000 {
                    cache
                        .set(&format!("key-{i}"), "v", SetOptions::default())
                        .await
                        .unwrap();
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut drainers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            drainers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(cache.drain().await.unwrap().into_keys());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        writer.await.unwrap();
        let mut all = Vec::new();
        for drainer in drainers {
            all.extend(drainer.await.unwrap());
        }
        all.extend(cache.drain().await.unwrap().into_keys());

        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(unique.len(), all.len(), "an entry was drained twice");
        assert_eq!(unique.len(), 2000);
    }
}
