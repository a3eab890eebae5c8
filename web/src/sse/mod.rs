//! SSE HTTP handler for the web layer.
//!
//! Connection tracking and framing live in the `sse` crate; this module only
//! turns a hub subscription into a streaming response.

pub mod handler;
