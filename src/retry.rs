use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, future::retry};
use tracing::warn;

use crate::error::{IngestorError, Result};

/// Retries `operation` with exponential backoff until it succeeds, returns a
/// permanent error, or `max_elapsed` has passed.
pub async fn execute_with_retry<F, Fut, T>(max_elapsed: Duration, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, backoff::Error<IngestorError>>>,
{
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..ExponentialBackoff::default()
    };

    retry(backoff, operation).await
}

pub fn transient_error(err: IngestorError) -> backoff::Error<IngestorError> {
    warn!("Transient error encountered, retrying: {}", err);
    backoff::Error::transient(err)
}

pub fn permanent_error(err: IngestorError) -> backoff::Error<IngestorError> {
    backoff::Error::permanent(err)
}

pub fn wrap_error(err: IngestorError) -> backoff::Error<IngestorError> {
    if err.is_transient() {
        transient_error(err)
    } else {
        permanent_error(err)
    }
}
