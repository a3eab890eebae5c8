//! Error types for the `sse` crate.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The device has no live connection that accepted the event.
    NoConnection,
    /// A connection's outbound buffer had no room for the event.
    BufferFull,
    /// The event could not be encoded.
    Serialization,
}

impl Error {
    pub fn no_connection(message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind: ErrorKind::NoConnection,
        }
    }

    pub fn buffer_full(message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind: ErrorKind::BufferFull,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "SSE error {:?}: {source}", self.error_kind),
            None => write!(f, "SSE error {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}
