//! Error types for the `cache` crate.

use std::error::Error as StdError;
use std::fmt;

/// Cache error holding its kind and, for backend failures, the underlying cause.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// No entry exists for the key.
    KeyNotFound,
    /// An entry exists but its expiry has passed.
    KeyExpired,
    /// A conditional insert found a live entry for the key.
    KeyExists,
    /// The storage backend failed.
    Backend,
    /// The cache could not be constructed from its configuration.
    Config,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    pub fn key_not_found() -> Self {
        Self::new(ErrorKind::KeyNotFound)
    }

    pub fn key_expired() -> Self {
        Self::new(ErrorKind::KeyExpired)
    }

    pub fn key_exists() -> Self {
        Self::new(ErrorKind::KeyExists)
    }

    pub fn config(message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind: ErrorKind::Config,
        }
    }

    /// True for `KeyNotFound` and `KeyExpired`, the two ways a key can be missing.
    pub fn is_miss(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::KeyNotFound | ErrorKind::KeyExpired
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.error_kind {
            ErrorKind::KeyNotFound => write!(f, "key not found"),
            ErrorKind::KeyExpired => write!(f, "key expired"),
            ErrorKind::KeyExists => write!(f, "key already exists"),
            ErrorKind::Backend | ErrorKind::Config => match &self.source {
                Some(source) => write!(f, "cache {:?} error: {source}", self.error_kind),
                None => write!(f, "cache {:?} error", self.error_kind),
            },
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

impl From<::redis::RedisError> for Error {
    fn from(err: ::redis::RedisError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Backend,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}
