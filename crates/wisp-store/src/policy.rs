use std::time::Duration;

use crate::error::BoundViolation;

/// Sub-second lifetimes are indistinguishable from "already gone".
pub const MIN_EXPIRATION: Duration = Duration::from_secs(1);

/// Configured ceilings for note creation. Pure checks, no state.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    pub size_limit_bytes: usize,
    pub meta_limit_bytes: usize,
    pub max_views: u32,
    pub max_expiration: Duration,
}

impl ExpirationPolicy {
    /// Check a creation request against the bounds, reporting the first
    /// violation. Returns the effective TTL: a missing `ttl` falls back to
    /// the maximum expiration, so every note ends up time-bounded.
    pub fn validate(
        &self,
        payload_bytes: usize,
        meta_bytes: usize,
        views: Option<u32>,
        ttl: Option<Duration>,
    ) -> Result<Duration, BoundViolation> {
        if payload_bytes > self.size_limit_bytes {
            return Err(BoundViolation::PayloadTooLarge {
                size: payload_bytes,
                limit: self.size_limit_bytes,
            });
        }
        if meta_bytes > self.meta_limit_bytes {
            return Err(BoundViolation::MetaTooLarge {
                size: meta_bytes,
                limit: self.meta_limit_bytes,
            });
        }
        if let Some(v) = views {
            if v == 0 || v > self.max_views {
                return Err(BoundViolation::ViewsOutOfRange {
                    requested: v,
                    max: self.max_views,
                });
            }
        }
        match ttl {
            None => Ok(self.max_expiration),
            Some(t) if t < MIN_EXPIRATION || t > self.max_expiration => {
                Err(BoundViolation::TtlOutOfRange {
                    requested: t,
                    min: MIN_EXPIRATION,
                    max: self.max_expiration,
                })
            }
            Some(t) => Ok(t),
        }
    }
}
