use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::StoreError;
use crate::store::backend::{deadline, Apply, AtomicStoreBackend};

/// The two independently budgeted request classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fixed window of requests from a single client identity.
#[derive(Debug, Serialize, Deserialize)]
struct WindowCounter {
    count: u32,
    window_start_ms: u64,
}

fn encode_counter(counter: &WindowCounter) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(counter, bincode::config::standard())
        .context("bincode encode rate counter")
}

fn decode_counter(bytes: &[u8]) -> Result<WindowCounter> {
    let (counter, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode rate counter")?;
    Ok(counter)
}

/// Fixed-window admission control, one counter per `(client, action)` pair.
///
/// Counters live in the backend under their own short expiry; stale clients
/// clean themselves up without touching any note's lifecycle. Admission
/// control is best-effort, not a safety invariant. The exactly-N-views
/// guarantee lives in the note store.
pub struct RateLimiter<B> {
    backend: Arc<B>,
    window: Duration,
    create_limit: u32,
    read_limit: u32,
    op_timeout: Duration,
}

impl<B> Clone for RateLimiter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            window: self.window,
            create_limit: self.create_limit,
            read_limit: self.read_limit,
            op_timeout: self.op_timeout,
        }
    }
}

impl<B: AtomicStoreBackend> RateLimiter<B> {
    pub fn new(backend: Arc<B>, cfg: &Config) -> Self {
        Self {
            backend,
            window: cfg.rate_limit_window,
            create_limit: cfg.rate_limit_create,
            read_limit: cfg.rate_limit_read,
            op_timeout: cfg.backend_timeout,
        }
    }

    fn limit_for(&self, action: Action) -> u32 {
        match action {
            Action::Create => self.create_limit,
            Action::Read => self.read_limit,
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Admit or reject one `action` from `client_id`. An elapsed window
    /// resets the counter; within the window each call increments it, and
    /// the call is allowed while the count stays under the action's
    /// ceiling. Denial is reported as `RateLimited`, never silently.
    pub async fn check(&self, client_id: &str, action: Action) -> Result<(), StoreError> {
        let key = format!("rl:{}:{}", action.as_str(), client_id);
        let limit = self.limit_for(action);
        let window_ms = self.window.as_millis() as u64;
        // Entries outlive their window slightly so a counter never expires
        // out from underneath an in-flight window.
        let entry_ttl = self.window + Duration::from_secs(1);
        let now = Self::now_ms();

        let allowed = deadline(
            self.op_timeout,
            self.backend.update(&key, |current| {
                let counter = current
                    .and_then(|bytes| decode_counter(bytes).ok())
                    .filter(|c| now.saturating_sub(c.window_start_ms) < window_ms)
                    .map(|c| WindowCounter {
                        count: c.count.saturating_add(1),
                        window_start_ms: c.window_start_ms,
                    })
                    .unwrap_or(WindowCounter {
                        count: 1,
                        window_start_ms: now,
                    });
                let allowed = counter.count <= limit;
                let apply = match encode_counter(&counter) {
                    // A fresh window re-arms the entry's expiry; an
                    // increment within the window keeps it.
                    Ok(bytes) => Apply::Put {
                        value: bytes,
                        ttl: (counter.count == 1).then_some(entry_ttl),
                    },
                    Err(_) => Apply::Keep,
                };
                (apply, allowed)
            }),
        )
        .await?;

        if allowed {
            Ok(())
        } else {
            warn!(client = %client_id, action = %action, "rate limit exceeded");
            Err(StoreError::RateLimited { action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn limiter(create: u32, read: u32, window: Duration) -> RateLimiter<MemoryBackend> {
        let cfg = Config {
            rate_limit_create: create,
            rate_limit_read: read,
            rate_limit_window: window,
            ..Config::default()
        };
        RateLimiter::new(Arc::new(MemoryBackend::new()), &cfg)
    }

    #[tokio::test]
    async fn allows_up_to_the_ceiling_then_denies() {
        let limiter = limiter(2, 60, Duration::from_secs(60));
        limiter.check("c1", Action::Create).await.unwrap();
        limiter.check("c1", Action::Create).await.unwrap();
        assert!(matches!(
            limiter.check("c1", Action::Create).await,
            Err(StoreError::RateLimited {
                action: Action::Create
            })
        ));
    }

    #[tokio::test]
    async fn budgets_are_independent_per_action() {
        let limiter = limiter(1, 60, Duration::from_secs(60));
        limiter.check("c1", Action::Create).await.unwrap();
        assert!(limiter.check("c1", Action::Create).await.is_err());
        // The create budget is spent; reads still go through.
        limiter.check("c1", Action::Read).await.unwrap();
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = limiter(1, 60, Duration::from_secs(60));
        limiter.check("c1", Action::Create).await.unwrap();
        limiter.check("c2", Action::Create).await.unwrap();
        assert!(limiter.check("c1", Action::Create).await.is_err());
    }

    #[tokio::test]
    async fn a_new_window_resets_the_count() {
        let limiter = limiter(1, 60, Duration::from_millis(150));
        limiter.check("c1", Action::Create).await.unwrap();
        assert!(limiter.check("c1", Action::Create).await.is_err());

        // Window length is wall-clock time, so sleep for real.
        tokio::time::sleep(Duration::from_millis(200)).await;
        limiter.check("c1", Action::Create).await.unwrap();
    }
}
