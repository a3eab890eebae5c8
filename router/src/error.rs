//! Error types for the `router` crate.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The ingress queue is at capacity.
    QueueFull,
    /// The consumer has stopped and no longer takes events.
    Closed,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.error_kind {
            ErrorKind::QueueFull => write!(f, "event queue is full"),
            ErrorKind::Closed => write!(f, "event queue is closed"),
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
