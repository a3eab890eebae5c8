//! Error types for the `push` crate.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The push provider rejected or could not take the message(s).
    ProviderFailed,
    /// A token failed too many consecutive deliveries and was blacklisted.
    MaxAttemptsExceeded,
    /// The provider call did not finish within the configured timeout.
    Timeout,
    /// The pending-item or blacklist cache failed.
    Cache,
    /// A pending item could not be encoded or decoded.
    Serialization,
}

impl Error {
    pub fn provider_failed(message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind: ErrorKind::ProviderFailed,
        }
    }

    pub fn max_attempts_exceeded(token: &str, attempts: u32) -> Self {
        Error {
            source: Some(format!("token {token} failed {attempts} time(s)").into()),
            error_kind: ErrorKind::MaxAttemptsExceeded,
        }
    }

    pub fn timeout(timeout: std::time::Duration) -> Self {
        Error {
            source: Some(format!("no response within {timeout:?}").into()),
            error_kind: ErrorKind::Timeout,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Push error {:?}: {source}", self.error_kind),
            None => write!(f, "Push error {:?}", self.error_kind),
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

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::ProviderFailed,
        }
    }
}
