use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use router::{Error as RouterError, ErrorKind as RouterErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(RouterError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.0.error_kind {
            RouterErrorKind::QueueFull | RouterErrorKind::Closed => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
            }
        }
    }
}

impl From<RouterError> for Error {
    fn from(err: RouterError) -> Self {
        Self(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_maps_to_service_unavailable() {
        for kind in [RouterErrorKind::QueueFull, RouterErrorKind::Closed] {
            let response = Error::from(RouterError::new(kind)).into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
