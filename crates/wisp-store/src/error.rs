use std::time::Duration;

use thiserror::Error;

use crate::limiter::Action;

/// A creation parameter exceeded one of the configured bounds. Carries the
/// specific bound and the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundViolation {
    #[error("payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("metadata is {size} bytes, limit is {limit}")]
    MetaTooLarge { size: usize, limit: usize },
    #[error("view count {requested} is outside 1..={max}")]
    ViewsOutOfRange { requested: u32, max: u32 },
    #[error("ttl {requested:?} is outside {min:?}..={max:?}")]
    TtlOutOfRange {
        requested: Duration,
        min: Duration,
        max: Duration,
    },
}

/// Everything an operation can fail with, mapped 1:1 to caller-visible
/// outcomes. Unknown, expired, and fully-consumed ids all read as
/// `NotFound`; callers must not be able to probe for a note's existence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] BoundViolation),
    #[error("note not found, expired, or already consumed")]
    NotFound,
    #[error("rate limit exceeded for {action}")]
    RateLimited { action: Action },
    /// Backend unreachable or timed out. Fatal for the request; retrying is
    /// the caller's decision, never ours.
    #[error("storage backend unavailable: {0}")]
    Unavailable(anyhow::Error),
}
