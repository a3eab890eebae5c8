use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub const RETRY_OUTCOME_RETRIED: &str = "retried";
pub const RETRY_OUTCOME_MAX_ATTEMPTS: &str = "max_attempts";

pub const BLACKLIST_OPERATION_ADDED: &str = "added";
pub const BLACKLIST_OPERATION_SKIPPED: &str = "skipped";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace("sms").subsystem("push")
}

/// Prometheus collectors for the push dispatcher. Created unregistered.
#[derive(Clone)]
pub struct Metrics {
    pub enqueued: IntCounterVec,
    pub retries: IntCounterVec,
    pub blacklist: IntCounterVec,
    pub errors: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            enqueued: IntCounterVec::new(
                opts("enqueued_total", "Total number of messages enqueued"),
                &["event"],
            )
            .expect("metric can not be created"),
            retries: IntCounterVec::new(
                opts("retries_total", "Total retry attempts by outcome"),
                &["outcome"],
            )
            .expect("metric can not be created"),
            blacklist: IntCounterVec::new(
                opts("blacklist_total", "Blacklist operations by type"),
                &["operation"],
            )
            .expect("metric can not be created"),
            errors: IntCounter::with_opts(opts("errors_total", "Total number of failed messages"))
                .expect("metric can not be created"),
        }
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.enqueued.clone()))?;
        registry.register(Box::new(self.retries.clone()))?;
        registry.register(Box::new(self.blacklist.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }

    pub(crate) fn count_retry(&self, outcome: &str) {
        self.retries.with_label_values(&[outcome]).inc();
    }

    pub(crate) fn count_blacklist(&self, operation: &str) {
        self.blacklist.with_label_values(&[operation]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
