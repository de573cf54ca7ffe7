use std::fmt;

use crate::TransportError;

/// What the retry policy needs to see of a response.
pub trait RetryableResponse {
    /// Numeric HTTP status code.
    fn status_code(&self) -> u16;

    /// Value of a header by case-insensitive name, if present and valid text.
    fn header_value(&self, name: &str) -> Option<&str>;
}

/// Result of one completed attempt.
///
/// At least one of error and response is always present.
#[derive(Debug)]
pub struct AttemptOutcome<R> {
    error: Option<TransportError>,
    response: Option<R>,
}

impl<R> AttemptOutcome<R> {
    /// The attempt produced a response and no transport error.
    pub fn success(response: R) -> Self {
        Self {
            error: None,
            response: Some(response),
        }
    }

    /// The attempt failed before any response was available.
    pub fn failure(error: TransportError) -> Self {
        Self {
            error: Some(error),
            response: None,
        }
    }

    /// The attempt failed after part of the response had arrived.
    pub fn partial(error: TransportError, response: R) -> Self {
        Self {
            error: Some(error),
            response: Some(response),
        }
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn response(&self) -> Option<&R> {
        self.response.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<TransportError>, Option<R>) {
        (self.error, self.response)
    }
}

impl<R> From<Result<R, TransportError>> for AttemptOutcome<R> {
    fn from(result: Result<R, TransportError>) -> Self {
        match result {
            Ok(response) => Self::success(response),
            Err(error) => Self::failure(error),
        }
    }
}

/// Terminal result handed to the caller exactly once per request.
///
/// Error and response are the last attempt's outcome, untouched; the retry
/// count travels next to them instead of being written into the error.
#[derive(Debug)]
pub struct Delivery<R> {
    pub(crate) error: Option<TransportError>,
    pub(crate) response: Option<R>,
    pub(crate) retries: u32,
    pub(crate) retry_enabled: bool,
}

impl<R> Delivery<R> {
    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn response(&self) -> Option<&R> {
        self.response.as_ref()
    }

    /// Number of re-attempts made before this delivery.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether retrying was enabled for the request that produced this.
    pub fn retry_enabled(&self) -> bool {
        self.retry_enabled
    }

    /// Splits the delivery into a plain result.
    ///
    /// A delivery with a transport error becomes a [`Failure`], keeping any
    /// partial response. The retry count is only attached when retrying was
    /// enabled.
    pub fn into_result(self) -> Result<R, Failure<R>> {
        match (self.error, self.response) {
            (None, Some(response)) => Ok(response),
            (Some(error), response) => Err(Failure {
                error,
                response,
                retries: self.retry_enabled.then_some(self.retries),
            }),
            (None, None) => unreachable!("attempt outcomes always carry an error or a response"),
        }
    }
}

/// Unsuccessful delivery in `std::error::Error` form.
#[derive(Debug)]
pub struct Failure<R> {
    pub error: TransportError,
    pub response: Option<R>,
    pub retries: Option<u32>,
}

impl<R: fmt::Debug> fmt::Display for Failure<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retries {
            Some(retries) => write!(f, "{} (after {retries} retries)", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl<R: fmt::Debug> std::error::Error for Failure<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
