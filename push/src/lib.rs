//! Debounced delivery of events to push-provider tokens.
//!
//! [`Dispatcher::enqueue`] parks one pending item per token in an
//! [`cache::ExpiringCache`]. A timer task drains the cache and hands the whole
//! batch to a [`PushTransport`] in one bounded call. Tokens that keep failing
//! are retried on later flushes and eventually blacklisted for a while.

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod transport;
pub mod upstream;

pub use dispatcher::{Config, Dispatcher, FlushOutcome};
pub use error::{Error, ErrorKind};
pub use metrics::Metrics;
pub use transport::PushTransport;
pub use upstream::Upstream;
