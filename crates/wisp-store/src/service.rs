use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::StoreError;
use crate::limiter::{Action, RateLimiter};
use crate::policy::ExpirationPolicy;
use crate::store::{AtomicStoreBackend, Note, NotePreview, NoteStore};

/// Everything a caller may ask for when storing a note.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Payload, already encrypted by the client.
    pub ciphertext: Vec<u8>,
    /// Opaque metadata stored and returned alongside the payload.
    pub meta: String,
    /// `None` means unlimited views, time-bound only.
    pub views: Option<u32>,
    /// `None` falls back to the configured maximum expiration.
    pub ttl: Option<Duration>,
}

/// Snapshot of the configured ceilings, for callers that surface them
/// (e.g. a status endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct Limits {
    pub size_limit_bytes: usize,
    pub meta_limit_bytes: usize,
    pub max_views: u32,
    pub max_expiration_secs: u64,
    pub allow_advanced: bool,
}

/// Front door for the operations the outside world calls: admission control
/// first, then validation, then the note store. Cheap to clone; clones share
/// the backend.
pub struct NoteService<B> {
    notes: NoteStore<B>,
    limiter: RateLimiter<B>,
    policy: ExpirationPolicy,
    allow_advanced: bool,
}

impl<B> Clone for NoteService<B> {
    fn clone(&self) -> Self {
        Self {
            notes: self.notes.clone(),
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
            allow_advanced: self.allow_advanced,
        }
    }
}

impl<B: AtomicStoreBackend> NoteService<B> {
    pub fn new(backend: Arc<B>, cfg: &Config) -> Self {
        Self {
            notes: NoteStore::new(backend.clone(), cfg.id_length, cfg.backend_timeout),
            limiter: RateLimiter::new(backend, cfg),
            policy: cfg.policy(),
            allow_advanced: cfg.allow_advanced,
        }
    }

    /// Validate and store a note, returning its id. Nothing is written when
    /// validation fails.
    pub async fn create_note(
        &self,
        mut req: CreateRequest,
        client_id: &str,
    ) -> Result<String, StoreError> {
        self.limiter.check(client_id, Action::Create).await?;

        // With advanced options disabled every note is burn-after-reading:
        // one view, default expiry, whatever the caller asked for.
        if !self.allow_advanced {
            req.views = Some(1);
            req.ttl = None;
        }

        let views = req.views;
        let ttl = self
            .policy
            .validate(req.ciphertext.len(), req.meta.len(), views, req.ttl)?;
        let id = self.notes.create(req.ciphertext, req.meta, views, ttl).await?;

        info!(
            id = %id,
            client = %client_id,
            views = ?views,
            ttl_secs = ttl.as_secs(),
            "note created"
        );
        Ok(id)
    }

    /// Read a note, consuming one view.
    pub async fn read_note(&self, id: &str, client_id: &str) -> Result<Note, StoreError> {
        self.limiter.check(client_id, Action::Read).await?;
        match self.notes.consume_view(id).await {
            Ok(note) => {
                info!(id = %id, client = %client_id, "note consumed");
                Ok(note)
            }
            Err(StoreError::NotFound) => {
                debug!(id = %id, client = %client_id, "read miss");
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Return a note's metadata without spending a view. Shares the read
    /// budget.
    pub async fn preview_note(
        &self,
        id: &str,
        client_id: &str,
    ) -> Result<NotePreview, StoreError> {
        self.limiter.check(client_id, Action::Read).await?;
        self.notes.peek(id).await
    }

    /// Administrative removal. Idempotent and not rate limited.
    pub async fn delete_note(&self, id: &str) -> Result<(), StoreError> {
        self.notes.delete(id).await
    }

    /// Round-trip probe against the backend.
    pub async fn health(&self) -> Result<(), StoreError> {
        self.notes.ping().await
    }

    /// The configured ceilings.
    pub fn limits(&self) -> Limits {
        Limits {
            size_limit_bytes: self.policy.size_limit_bytes,
            meta_limit_bytes: self.policy.meta_limit_bytes,
            max_views: self.policy.max_views,
            max_expiration_secs: self.policy.max_expiration.as_secs(),
            allow_advanced: self.allow_advanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoundViolation;
    use crate::store::MemoryBackend;

    fn service(cfg: Config) -> NoteService<MemoryBackend> {
        NoteService::new(Arc::new(MemoryBackend::new()), &cfg)
    }

    fn request(payload: &[u8]) -> CreateRequest {
        CreateRequest {
            ciphertext: payload.to_vec(),
            ..CreateRequest::default()
        }
    }

    #[tokio::test]
    async fn advanced_disabled_forces_a_single_view() {
        let svc = service(Config {
            allow_advanced: false,
            ..Config::default()
        });

        let id = svc
            .create_note(
                CreateRequest {
                    views: Some(50),
                    ttl: Some(Duration::from_secs(60)),
                    ..request(b"secret")
                },
                "c1",
            )
            .await
            .unwrap();

        svc.read_note(&id, "c1").await.unwrap();
        assert!(matches!(
            svc.read_note(&id, "c1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn oversized_meta_is_rejected_by_its_own_bound() {
        let svc = service(Config {
            meta_limit_bytes: 8,
            ..Config::default()
        });
        let err = svc
            .create_note(
                CreateRequest {
                    meta: "way too much metadata".into(),
                    ..request(b"x")
                },
                "c1",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(BoundViolation::MetaTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn limits_reflect_the_config() {
        let svc = service(Config::default());
        let limits = svc.limits();
        assert_eq!(limits.size_limit_bytes, 80 * 1024 * 1024);
        assert_eq!(limits.max_views, 100);
        assert_eq!(limits.max_expiration_secs, 21_600);
        assert!(limits.allow_advanced);
    }

    #[tokio::test]
    async fn health_probe_succeeds_on_a_live_backend() {
        let svc = service(Config::default());
        svc.health().await.unwrap();
    }
}
