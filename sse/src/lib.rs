//! Server-Sent Events (SSE) delivery to connected devices.
//!
//! Devices without a push token keep a long-lived event stream open and the
//! [`Hub`] writes events straight onto it.
//!
//! # Architecture
//!
//! - **Many connections per device**: reconnects and multiple clients for the
//!   same device are all live at once; an event goes to every one of them.
//! - **Dual-index registry**: O(1) lookups for both connection management and
//!   device-scoped routing via separate DashMap indices.
//! - **Bounded buffers**: each connection has a small outbound buffer. Sending
//!   never waits; a full buffer skips that connection and is counted.
//! - **Ephemeral events**: a device that is offline misses the event.
//!
//! # Message Flow
//!
//! 1. A device opens `GET /mobile/v1/events/:device_id`
//! 2. The web layer calls [`Hub::connect`] and streams the returned
//!    [`Subscription`] as the response body
//! 3. [`Hub::send`] looks up the device's connections and queues a [`Frame`]
//!    on each
//! 4. The subscription's serving loop writes frames and periodic keepalives
//!    until the client goes away or the hub closes
//! 5. Dropping the stream deregisters the connection
//!
//! # Wire format
//!
//! ```text
//! event: <type>
//! data: <json>
//!
//! :keepalive
//!
//! ```
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry with dual-index architecture and type-safe ConnectionId
//! - `hub`: device-scoped sending, connection lifecycle and the serving stream
//! - `frame`: wire encoding of events and keepalives

pub mod connection;
pub mod error;
pub mod frame;
pub mod hub;
pub mod metrics;

pub use error::{Error, ErrorKind};
pub use frame::Frame;
pub use hub::{Hub, HubConfig, Subscription};
pub use metrics::Metrics;
