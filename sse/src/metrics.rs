use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub const ERROR_BUFFER_FULL: &str = "buffer_full";
pub const ERROR_NO_CONNECTION: &str = "no_connection";
pub const ERROR_CLOSED: &str = "closed";
pub const ERROR_MARSHAL: &str = "marshal_error";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace("sms").subsystem("sse")
}

/// Prometheus collectors for the SSE hub. Created unregistered.
#[derive(Clone)]
pub struct Metrics {
    pub active_connections: IntGauge,
    pub events_sent: IntCounterVec,
    pub connection_errors: IntCounterVec,
    pub keepalives_sent: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            active_connections: IntGauge::with_opts(opts(
                "active_connections",
                "Current number of active SSE connections",
            ))
            .expect("metric can not be created"),
            events_sent: IntCounterVec::new(
                opts(
                    "events_sent_total",
                    "Total number of SSE events sent, labeled by event type",
                ),
                &["event_type"],
            )
            .expect("metric can not be created"),
            connection_errors: IntCounterVec::new(
                opts(
                    "connection_errors_total",
                    "Total number of SSE connection errors, labeled by error type",
                ),
                &["error_type"],
            )
            .expect("metric can not be created"),
            keepalives_sent: IntCounter::with_opts(opts(
                "keepalives_sent_total",
                "Total keepalive messages sent",
            ))
            .expect("metric can not be created"),
        }
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.active_connections.clone()))?;
        registry.register(Box::new(self.events_sent.clone()))?;
        registry.register(Box::new(self.connection_errors.clone()))?;
        registry.register(Box::new(self.keepalives_sent.clone()))?;
        Ok(())
    }

    pub(crate) fn connection_error(&self, error_type: &str) {
        self.connection_errors.with_label_values(&[error_type]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
