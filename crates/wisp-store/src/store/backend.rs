use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::timeout;

use crate::error::StoreError;

/// What an [`AtomicStoreBackend::update`] closure decided to do with the key.
#[derive(Debug)]
pub enum Apply {
    /// Leave the key untouched.
    Keep,
    /// Store `value`. `ttl: None` keeps the key's remaining expiry (a
    /// mutation must never extend a note's clock); `Some` (re)arms it.
    /// Writing a key that was absent requires `Some`; there is no expiry
    /// to keep.
    Put {
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    /// Remove the key. Removing an absent key is a no-op.
    Delete,
}

/// The narrow contract the note store requires of any backing store.
///
/// Expired keys must be indistinguishable from keys that were never written,
/// and the store purges them on its own; callers never sweep. `update` is
/// the one primitive every view-counted mutation is built on: per key, no
/// other `update` or `put` may interleave between its read and its write
/// (linearizable per key). Across different keys nothing is ordered.
#[allow(async_fn_in_trait)]
pub trait AtomicStoreBackend: Send + Sync + 'static {
    /// Create-or-replace `key`, expiring after `ttl`. The value must be
    /// visible to every subsequent operation once this returns.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Atomically read `key` and apply `f` to what is there (`None` when
    /// absent or expired), then carry out the returned [`Apply`]. The second
    /// tuple element is handed back to the caller. `f` may be invoked more
    /// than once if the implementation retries internally, so it must be
    /// pure.
    async fn update<F, T>(&self, key: &str, f: F) -> Result<T>
    where
        F: Fn(Option<&[u8]>) -> (Apply, T) + Send,
        T: Send;
}

/// Run a backend call against a deadline. A slow or failed backend surfaces
/// as [`StoreError::Unavailable`], never as an indefinite hang, and is not
/// retried here. Retry policy belongs to the caller.
pub(crate) async fn deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T, StoreError> {
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StoreError::Unavailable(e)),
        Err(_) => Err(StoreError::Unavailable(anyhow!(
            "backend call timed out after {limit:?}"
        ))),
    }
}
