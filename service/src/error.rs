//! Error types for the `service` crate.

use std::error::Error as StdError;
use std::fmt;

/// Failures while assembling the application state.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A setting could not be turned into a working component.
    Config,
    Database,
    Cache,
    /// A collector could not be registered.
    Metrics,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Service error {:?}: {source}", self.error_kind),
            None => write!(f, "Service error {:?}", self.error_kind),
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

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Database,
        }
    }
}

impl From<cache::Error> for Error {
    fn from(err: cache::Error) -> Self {
        let error_kind = match err.error_kind {
            cache::ErrorKind::Config => ErrorKind::Config,
            _ => ErrorKind::Cache,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<push::Error> for Error {
    fn from(err: push::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Metrics,
        }
    }
}
