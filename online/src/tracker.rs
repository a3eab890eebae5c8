use cache::{ExpiringCache, SetOptions};
use chrono::{DateTime, SecondsFormat, Utc};
use events::DeviceDirectory;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::metrics::{self, Metrics};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub flush_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Accumulates last-seen timestamps and periodically persists them.
pub struct OnlineTracker {
    config: Config,
    cache: Arc<dyn ExpiringCache>,
    directory: Arc<dyn DeviceDirectory>,
    metrics: Metrics,
}

impl OnlineTracker {
    pub fn new(
        config: Config,
        cache: Arc<dyn ExpiringCache>,
        directory: Arc<dyn DeviceDirectory>,
    ) -> Self {
        let flush_interval = if config.flush_interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            config.flush_interval
        };

        Self {
            config: Config { flush_interval },
            cache,
            directory,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Records that `device_id` was seen just now. Failures are only logged.
    pub async fn set_online(&self, device_id: &str) {
        let last_seen = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!("Setting online status of device {device_id} to {last_seen}");

        let timer = self.metrics.cache_latency.start_timer();
        let result = self
            .cache
            .set(device_id, &last_seen, SetOptions::default())
            .await;
        timer.observe_duration();

        match result {
            Ok(()) => {
                self.metrics
                    .count_cache_operation(metrics::OPERATION_SET, metrics::STATUS_SUCCESS);
                self.metrics.count_status_set(true);
            }
            Err(e) => {
                self.metrics
                    .count_cache_operation(metrics::OPERATION_SET, metrics::STATUS_ERROR);
                self.metrics.count_status_set(false);
                error!("Failed to set online status of device {device_id}: {e}");
            }
        }
    }

    /// Drains the accumulated timestamps into the device directory.
    ///
    /// Returns how many devices were written. On failure the batch is lost.
    pub async fn persist(&self) -> Result<usize, Error> {
        let timer = self.metrics.persistence_latency.start_timer();
        let result = self.drain_and_store().await;
        timer.observe_duration();
        result
    }

    async fn drain_and_store(&self) -> Result<usize, Error> {
        let items = match self.cache.drain().await {
            Ok(items) => {
                self.metrics
                    .count_cache_operation(metrics::OPERATION_DRAIN, metrics::STATUS_SUCCESS);
                items
            }
            Err(e) => {
                self.metrics
                    .count_cache_operation(metrics::OPERATION_DRAIN, metrics::STATUS_ERROR);
                return Err(e.into());
            }
        };
        self.metrics.batch_size.set(items.len() as i64);

        if items.is_empty() {
            debug!("No online statuses to persist");
            return Ok(0);
        }

        let timestamps = parse_last_seen(items);
        let count = timestamps.len();

        self.directory
            .set_last_seen(timestamps)
            .await
            .inspect_err(|_| self.metrics.persistence_errors.inc())?;

        info!("Set last seen for {count} device(s)");
        Ok(count)
    }

    /// Persists every flush interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.flush_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Online tracker started, persisting every {period:?}");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("Persisting online status");
                    if let Err(e) = self.persist().await {
                        error!("Failed to persist online status: {e}");
                    }
                }
            }
        }
        info!("Online tracker stopped");
    }
}

fn parse_last_seen(items: HashMap<String, String>) -> HashMap<String, DateTime<Utc>> {
    items
        .into_iter()
        .map(|(device_id, value)| {
            let last_seen = DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|e| {
                    warn!("Failed to parse last seen {value:?} of device {device_id}: {e}");
                    Utc::now()
                });
            (device_id, last_seen)
        })
        .collect()
}
