use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use tokio::time::{self, Instant};
use tracing::debug;

use super::backend::{Apply, AtomicStoreBackend};

#[derive(Debug)]
struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory reference backend.
///
/// Per-key atomicity comes from holding the map's entry guard across the
/// whole read-apply-write sequence; nothing awaits while a guard is held.
/// Expired slots read as absent the moment their deadline passes and are
/// physically dropped either on the next access or by the sweep task.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    map: Arc<DashMap<String, Slot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired slot. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, slot| !slot.is_expired(now));
        before - self.map.len()
    }

    /// Number of slots physically present, expired stragglers included.
    /// Diagnostic only.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Spawn a Tokio task that purges expired slots every `interval`.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                let removed = self.purge_expired();
                if removed > 0 {
                    debug!(removed, "swept expired entries");
                }
            }
        });
    }
}

impl AtomicStoreBackend for MemoryBackend {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let slot = Slot {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.map.insert(key.to_owned(), slot);
        Ok(())
    }

    async fn update<F, T>(&self, key: &str, f: F) -> Result<T>
    where
        F: Fn(Option<&[u8]>) -> (Apply, T) + Send,
        T: Send,
    {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        match self.map.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let (apply, out) = f(Some(&occupied.get().value));
                match apply {
                    Apply::Keep => {}
                    Apply::Put { value, ttl } => {
                        let expires_at = match ttl {
                            Some(t) => now + t,
                            None => occupied.get().expires_at,
                        };
                        occupied.insert(Slot { value, expires_at });
                    }
                    Apply::Delete => {
                        occupied.remove();
                    }
                }
                Ok(out)
            }
            // An expired slot reads as absent; whatever happens next also
            // evicts the stale value.
            Entry::Occupied(mut occupied) => {
                let (apply, out) = f(None);
                match apply {
                    Apply::Put {
                        value,
                        ttl: Some(ttl),
                    } => {
                        occupied.insert(Slot {
                            value,
                            expires_at: now + ttl,
                        });
                    }
                    Apply::Put { ttl: None, .. } => {
                        occupied.remove();
                        anyhow::bail!("update wrote an absent key without a ttl");
                    }
                    Apply::Keep | Apply::Delete => {
                        occupied.remove();
                    }
                }
                Ok(out)
            }
            Entry::Vacant(vacant) => {
                let (apply, out) = f(None);
                match apply {
                    Apply::Put {
                        value,
                        ttl: Some(ttl),
                    } => {
                        vacant.insert(Slot {
                            value,
                            expires_at: now + ttl,
                        });
                    }
                    Apply::Put { ttl: None, .. } => {
                        anyhow::bail!("update wrote an absent key without a ttl");
                    }
                    Apply::Keep | Apply::Delete => {}
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    async fn read(backend: &MemoryBackend, key: &str) -> Option<Vec<u8>> {
        backend
            .update(key, |cur| (Apply::Keep, cur.map(|b| b.to_vec())))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_then_read_back() {
        let backend = MemoryBackend::new();
        backend.put("k", b"v".to_vec(), secs(60)).await.unwrap();
        assert_eq!(read(&backend, "k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn absent_key_reads_as_none() {
        let backend = MemoryBackend::new();
        assert_eq!(read(&backend, "missing").await, None);
    }

    #[tokio::test]
    async fn delete_on_absent_key_is_a_noop() {
        let backend = MemoryBackend::new();
        backend
            .update("missing", |_| (Apply::Delete, ()))
            .await
            .unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_reads_as_absent() {
        let backend = MemoryBackend::new();
        backend.put("k", b"v".to_vec(), secs(10)).await.unwrap();
        time::advance(secs(11)).await;
        assert_eq!(read(&backend, "k").await, None);
        // The lazy eviction removed the stale slot.
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn put_without_ttl_preserves_remaining_expiry() {
        let backend = MemoryBackend::new();
        backend.put("k", b"a".to_vec(), secs(10)).await.unwrap();

        time::advance(secs(8)).await;
        backend
            .update("k", |_| {
                (
                    Apply::Put {
                        value: b"b".to_vec(),
                        ttl: None,
                    },
                    (),
                )
            })
            .await
            .unwrap();

        // Two seconds of the original lifetime were left; the rewrite must
        // not have extended them.
        time::advance(secs(1)).await;
        assert_eq!(read(&backend, "k").await, Some(b"b".to_vec()));
        time::advance(secs(2)).await;
        assert_eq!(read(&backend, "k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn put_with_ttl_rearms_expiry() {
        let backend = MemoryBackend::new();
        backend.put("k", b"a".to_vec(), secs(10)).await.unwrap();

        time::advance(secs(8)).await;
        backend
            .update("k", |_| {
                (
                    Apply::Put {
                        value: b"b".to_vec(),
                        ttl: Some(secs(10)),
                    },
                    (),
                )
            })
            .await
            .unwrap();

        time::advance(secs(9)).await;
        assert_eq!(read(&backend, "k").await, Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn writing_an_absent_key_without_ttl_errors() {
        let backend = MemoryBackend::new();
        let result = backend
            .update("missing", |_| {
                (
                    Apply::Put {
                        value: b"v".to_vec(),
                        ttl: None,
                    },
                    (),
                )
            })
            .await;
        assert!(result.is_err());
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_purges_in_the_background() {
        let backend = MemoryBackend::new();
        backend.put("dead", b"v".to_vec(), secs(5)).await.unwrap();
        backend.clone().spawn_sweep(secs(10));

        // The paused clock auto-advances through the sweeper's tick at t=10
        // before this sleep resolves at t=11.
        time::sleep(secs(11)).await;
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_slots() {
        let backend = MemoryBackend::new();
        backend.put("dead", b"v".to_vec(), secs(5)).await.unwrap();
        backend.put("live", b"v".to_vec(), secs(60)).await.unwrap();

        time::advance(secs(6)).await;
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
        assert_eq!(read(&backend, "live").await, Some(b"v".to_vec()));
    }
}
