use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub const OPERATION_SET: &str = "set";
pub const OPERATION_DRAIN: &str = "drain";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace("sms").subsystem("online")
}

fn histogram(name: &str, help: &str) -> Histogram {
    Histogram::with_opts(
        HistogramOpts::new(name, help)
            .namespace("sms")
            .subsystem("online")
            .buckets(LATENCY_BUCKETS.to_vec()),
    )
    .expect("metric can not be created")
}

/// Prometheus collectors for the online tracker. Created unregistered.
#[derive(Clone)]
pub struct Metrics {
    pub status_set: IntCounterVec,
    pub cache_operations: IntCounterVec,
    pub cache_latency: Histogram,
    pub persistence_latency: Histogram,
    pub persistence_errors: IntCounter,
    pub batch_size: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            status_set: IntCounterVec::new(
                opts("status_set_total", "Total number of online status updates"),
                &["status"],
            )
            .expect("metric can not be created"),
            cache_operations: IntCounterVec::new(
                opts("cache_operations_total", "Total cache operations by type"),
                &["operation", "status"],
            )
            .expect("metric can not be created"),
            cache_latency: histogram(
                "cache_latency_seconds",
                "Cache operation latency in seconds",
            ),
            persistence_latency: histogram(
                "persistence_latency_seconds",
                "Persistence operation latency in seconds",
            ),
            persistence_errors: IntCounter::with_opts(opts(
                "persistence_errors_total",
                "Total persistence errors",
            ))
            .expect("metric can not be created"),
            batch_size: IntGauge::with_opts(opts("batch_size", "Current batch size"))
                .expect("metric can not be created"),
        }
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.status_set.clone()))?;
        registry.register(Box::new(self.cache_operations.clone()))?;
        registry.register(Box::new(self.cache_latency.clone()))?;
        registry.register(Box::new(self.persistence_latency.clone()))?;
        registry.register(Box::new(self.persistence_errors.clone()))?;
        registry.register(Box::new(self.batch_size.clone()))?;
        Ok(())
    }

    pub(crate) fn count_cache_operation(&self, operation: &str, status: &str) {
        self.cache_operations
            .with_label_values(&[operation, status])
            .inc();
    }

    pub(crate) fn count_status_set(&self, success: bool) {
        let status = if success { STATUS_SUCCESS } else { STATUS_ERROR };
        self.status_set.with_label_values(&[status]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
