//! Last-seen tracking for devices.
//!
//! Marking a device online is a cheap cache write. A timer task periodically
//! drains the cache and writes the whole batch of timestamps to the
//! [`events::DeviceDirectory`] in one call.

pub mod error;
pub mod metrics;
pub mod tracker;

pub use error::{Error, ErrorKind};
pub use metrics::Metrics;
pub use tracker::{Config, OnlineTracker};
