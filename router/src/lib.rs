//! Fan-out of domain events to devices.
//!
//! Producers call [`EventRouter::notify`], which never waits: the event goes
//! onto a bounded queue or the call fails with `QueueFull`. A single consumer
//! task ([`EventRouter::run`]) takes events off the queue in order, resolves
//! the target devices through the [`events::DeviceDirectory`] and hands each
//! device to the push dispatcher (devices with a push token) or to the SSE hub.

pub mod error;
pub mod metrics;
pub mod router;

pub use error::{Error, ErrorKind};
pub use metrics::Metrics;
pub use router::{Config, EventRouter, QueuedEvent};
