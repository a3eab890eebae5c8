use prometheus::{IntCounterVec, Opts, Registry};

pub const DELIVERY_PUSH: &str = "push";
pub const DELIVERY_SSE: &str = "sse";
pub const DELIVERY_UNKNOWN: &str = "unknown";

pub const REASON_QUEUE_FULL: &str = "queue_full";
pub const REASON_PROVIDER_FAILED: &str = "provider_failed";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace("sms").subsystem("events")
}

/// Prometheus collectors for the event router. Created unregistered.
#[derive(Clone)]
pub struct Metrics {
    pub enqueued: IntCounterVec,
    pub sent: IntCounterVec,
    pub failed: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            enqueued: IntCounterVec::new(
                opts("enqueued_total", "Total number of events enqueued"),
                &["event"],
            )
            .expect("metric can not be created"),
            sent: IntCounterVec::new(
                opts("sent_total", "Total number of events sent"),
                &["event", "delivery_type"],
            )
            .expect("metric can not be created"),
            failed: IntCounterVec::new(
                opts("failed_total", "Total number of failed notifications"),
                &["event", "delivery_type", "reason"],
            )
            .expect("metric can not be created"),
        }
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.enqueued.clone()))?;
        registry.register(Box::new(self.sent.clone()))?;
        registry.register(Box::new(self.failed.clone()))?;
        Ok(())
    }

    pub(crate) fn count_sent(&self, event: &str, delivery_type: &str) {
        self.sent.with_label_values(&[event, delivery_type]).inc();
    }

    pub(crate) fn count_failed(&self, event: &str, delivery_type: &str, reason: &str) {
        self.failed
            .with_label_values(&[event, delivery_type, reason])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
