//! Error types for the `online` crate.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The last-seen cache could not be drained.
    Cache,
    /// The device directory rejected the batch.
    Directory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Online status error {:?}: {source}", self.error_kind),
            None => write!(f, "Online status error {:?}", self.error_kind),
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

impl From<cache::Error> for Error {
    fn from(err: cache::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Cache,
        }
    }
}

impl From<events::Error> for Error {
    fn from(err: events::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Directory,
        }
    }
}
