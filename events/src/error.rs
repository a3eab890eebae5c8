//! Error types for the `events` crate.

use std::error::Error as StdError;
use std::fmt;

/// Errors reported by a [`crate::DeviceDirectory`] implementation.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The directory could not be queried or updated.
    Directory,
}

impl Error {
    pub fn directory(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error {
            source: Some(source.into()),
            error_kind: ErrorKind::Directory,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Device directory error: {source}"),
            None => write!(f, "Device directory error: {:?}", self.error_kind),
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
