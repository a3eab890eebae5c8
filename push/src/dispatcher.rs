use cache::{ErrorKind as CacheErrorKind, ExpiringCache, SetOptions};
use events::Event;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::metrics::{self, Metrics};
use crate::transport::PushTransport;

/// Shortest allowed debounce interval.
pub const MIN_DEBOUNCE: Duration = Duration::from_secs(5);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BLACKLIST_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interval between flushes; raised to [`MIN_DEBOUNCE`] if shorter.
    pub debounce: Duration,
    /// Upper bound on one transport call; zero means the default of one second.
    pub timeout: Duration,
    /// Consecutive failed flushes after which a token is blacklisted.
    pub max_retries: u32,
    /// How long a blacklisted token is skipped; zero means the default of
    /// fifteen minutes.
    pub blacklist_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: MIN_DEBOUNCE,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            blacklist_ttl: DEFAULT_BLACKLIST_TTL,
        }
    }
}

impl Config {
    fn normalized(self) -> Self {
        Self {
            debounce: self.debounce.max(MIN_DEBOUNCE),
            timeout: if self.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                self.timeout
            },
            max_retries: self.max_retries.max(1),
            blacklist_ttl: if self.blacklist_ttl.is_zero() {
                DEFAULT_BLACKLIST_TTL
            } else {
                self.blacklist_ttl
            },
        }
    }
}

/// What is parked in the pending cache under a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PendingItem {
    token: String,
    event: Event,
    retries: u32,
}

/// Result of one flush, mostly useful for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub delivered: usize,
    pub retried: usize,
    pub blacklisted: usize,
    pub dropped: usize,
}

/// Debounced, cache-backed batching of push deliveries.
pub struct Dispatcher {
    config: Config,
    transport: Arc<dyn PushTransport>,
    pending: Arc<dyn ExpiringCache>,
    blacklist: Arc<dyn ExpiringCache>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        transport: Arc<dyn PushTransport>,
        pending: Arc<dyn ExpiringCache>,
        blacklist: Arc<dyn ExpiringCache>,
    ) -> Self {
        Self {
            config: config.normalized(),
            transport,
            pending,
            blacklist,
            metrics: Metrics::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Parks `event` for `token` until the next flush.
    ///
    /// A newer event replaces a pending one for the same token. Blacklisted
    /// tokens are skipped without an error.
    pub async fn enqueue(&self, token: &str, event: &Event) -> Result<(), Error> {
        match self.blacklist.get(token).await {
            Ok(_) => {
                self.metrics
                    .count_blacklist(metrics::BLACKLIST_OPERATION_SKIPPED);
                debug!("Skipping blacklisted push token {token}");
                return Ok(());
            }
            Err(e) if e.is_miss() => {}
            Err(e) => warn!("Failed to check push blacklist for token {token}: {e}"),
        }

        let item = PendingItem {
            token: token.to_string(),
            event: event.clone(),
            retries: 0,
        };
        let value = serde_json::to_string(&item)?;
        self.pending.set(token, &value, SetOptions::default()).await?;

        self.metrics
            .enqueued
            .with_label_values(&[event.event_type().as_str()])
            .inc();
        Ok(())
    }

    /// Drains pending items and sends them as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        let drained = match self.pending.drain().await {
            Ok(drained) => drained,
            Err(e) => {
                error!("Failed to drain pending push messages: {e}");
                return outcome;
            }
        };
        if drained.is_empty() {
            return outcome;
        }

        let mut items: HashMap<String, PendingItem> = HashMap::with_capacity(drained.len());
        for (token, value) in drained {
            match serde_json::from_str::<PendingItem>(&value) {
                Ok(item) => {
                    items.insert(token, item);
                }
                Err(e) => {
                    warn!("Dropping unreadable pending push for token {token}: {e}");
                    outcome.dropped += 1;
                }
            }
        }
        if items.is_empty() {
            return outcome;
        }

        let messages: HashMap<String, Event> = items
            .iter()
            .map(|(token, item)| (token.clone(), item.event.clone()))
            .collect();

        info!("Sending {} push message(s)", messages.len());
        let sent = time::timeout(self.config.timeout, self.transport.send(messages)).await;
        let errors = match sent {
            Ok(Ok(errors)) => errors,
            Ok(Err(e)) => return self.batch_failed(outcome, items.len(), &e),
            Err(_) => {
                let e = Error::timeout(self.config.timeout);
                return self.batch_failed(outcome, items.len(), &e);
            }
        };

        if errors.is_empty() {
            info!("Sent {} push message(s)", items.len());
            outcome.delivered = items.len();
            return outcome;
        }

        self.metrics.errors.inc_by(errors.len() as u64);

        for (token, send_error) in errors {
            let Some(mut item) = items.remove(&token) else {
                warn!("Push transport reported an error for unknown token {token}");
                continue;
            };
            error!("Failed to send push message to token {token}: {send_error}");

            item.retries += 1;
            if item.retries >= self.config.max_retries {
                self.blacklist_token(&token, item.retries).await;
                outcome.blacklisted += 1;
                continue;
            }

            self.retry_later(&item).await;
            outcome.retried += 1;
        }

        outcome.delivered = items.len();
        outcome
    }

    fn batch_failed(&self, mut outcome: FlushOutcome, count: usize, e: &Error) -> FlushOutcome {
        self.metrics.errors.inc_by(count as u64);
        error!("Failed to send {count} push message(s): {e}");
        outcome.dropped += count;
        outcome
    }

    async fn blacklist_token(&self, token: &str, attempts: u32) {
        if let Err(e) = self
            .blacklist
            .set(token, "", SetOptions::with_ttl(self.config.blacklist_ttl))
            .await
        {
            warn!("Failed to blacklist push token {token}: {e}");
        }

        self.metrics
            .count_blacklist(metrics::BLACKLIST_OPERATION_ADDED);
        self.metrics.count_retry(metrics::RETRY_OUTCOME_MAX_ATTEMPTS);
        warn!(
            "Blacklisting push token for {:?}: {}",
            self.config.blacklist_ttl,
            Error::max_attempts_exceeded(token, attempts)
        );
    }

    // Conditional insert so a newer enqueue that landed during the send wins.
    async fn retry_later(&self, item: &PendingItem) {
        let value = match serde_json::to_string(item) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to encode push retry for token {}: {e}", item.token);
                return;
            }
        };

        match self
            .pending
            .set_or_fail(&item.token, &value, SetOptions::default())
            .await
        {
            Ok(()) => {}
            Err(e) if e.error_kind == CacheErrorKind::KeyExists => {
                info!(
                    "Newer push message pending for token {}, dropping retry",
                    item.token
                );
            }
            Err(e) => warn!("Failed to requeue push message for token {}: {e}", item.token),
        }

        self.metrics.count_retry(metrics::RETRY_OUTCOME_RETRIED);
    }

    // Expired entries stay in an in-process blacklist until swept.
    async fn sweep_blacklist(&self) {
        if let Err(e) = self.blacklist.cleanup().await {
            warn!("Failed to clean up push blacklist: {e}");
        }
    }

    /// Flushes every debounce interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.config.debounce, self.config.debounce);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Push dispatcher started, flushing every {:?}",
            self.config.debounce
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.flush().await;
                    if outcome != FlushOutcome::default() {
                        debug!("Push flush finished: {outcome:?}");
                    }
                    self.sweep_blacklist().await;
                }
            }
        }
        info!("Push dispatcher stopped");
    }
}
