//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Run `fut` on its own task, bounded by `limit` and `cancel`.
///
/// A panic inside `fut` comes back as `Error::TaskJoin` instead of
/// unwinding into the caller. On timeout or cancellation the task is
/// aborted.
pub async fn run_isolated<F, T>(fut: F, limit: Duration, cancel: &CancellationToken) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut handle = tokio::spawn(fut);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            handle.abort();
            Err(Error::Cancelled)
        }
        joined = &mut handle => joined.map_err(join_error)?,
        _ = sleep(limit) => {
            handle.abort();
            Err(Error::Timeout(limit))
        }
    }
}

fn join_error(err: JoinError) -> Error {
    if !err.is_panic() {
        return Error::TaskJoin(err.to_string());
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Error::TaskJoin(format!("handler panicked: {}", message))
}
