use crate::{RetryableResponse, TransportError};

/// Decides whether a completed attempt is worth another try.
///
/// Retryable when any of these holds:
/// - the transport error is transient (reset, connect/socket timeout,
///   address lookup failure, unknown host, client timeout, cross-origin);
/// - the response status is 5xx;
/// - the status is listed in `retryable_statuses` and lies outside
///   200..=399, which lets callers opt into codes like 404 or 429.
pub fn should_retry<R: RetryableResponse>(
    error: Option<&TransportError>,
    response: Option<&R>,
    retryable_statuses: &[u16],
) -> bool {
    if error.is_some_and(|err| err.kind().is_transient()) {
        return true;
    }

    response.is_some_and(|response| {
        let status = response.status_code();
        status >= 500
            || ((status >= 400 || status < 200) && retryable_statuses.contains(&status))
    })
}
