use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use rand::Rng;
use tracing::{debug, warn};

use super::backend::{deadline, Apply, AtomicStoreBackend};
use super::model::{self, Note, NotePreview, NoteRecord};
use crate::error::StoreError;

/// Key used by [`NoteStore::ping`] round-trips.
const PROBE_KEY: &str = "health:probe";
const PROBE_TTL: Duration = Duration::from_secs(5);

fn note_key(id: &str) -> String {
    format!("note:{id}")
}

/// Generate an unpredictable note id of `len` hex characters from the
/// thread-local CSPRNG. At the default length of 32 that is 128 bits, so
/// collisions among live notes are negligible at any realistic volume.
fn generate_id(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    rand::thread_rng().fill(&mut bytes[..]);
    let mut id = hex::encode(bytes);
    id.truncate(len);
    id
}

/// What the atomic consume closure observed for an id.
enum Lookup {
    Missing,
    Corrupt,
    Found(NoteRecord),
}

/// Orchestrates creation, atomic consumption, and deletion of notes on top
/// of an [`AtomicStoreBackend`]. Cheap to clone; clones share the backend.
pub struct NoteStore<B> {
    backend: Arc<B>,
    id_length: usize,
    op_timeout: Duration,
}

impl<B> Clone for NoteStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            id_length: self.id_length,
            op_timeout: self.op_timeout,
        }
    }
}

impl<B: AtomicStoreBackend> NoteStore<B> {
    pub fn new(backend: Arc<B>, id_length: usize, op_timeout: Duration) -> Self {
        Self {
            backend,
            id_length,
            op_timeout,
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Store a new note under a freshly generated id and arm `ttl` as its
    /// store-level expiry. `ttl` has already been validated. The id is
    /// returned only once the write is visible to readers.
    pub async fn create(
        &self,
        ciphertext: Vec<u8>,
        meta: String,
        remaining_views: Option<u32>,
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let record = NoteRecord {
            ciphertext,
            meta,
            remaining_views,
            created_at: Self::now(),
        };
        let bytes = model::encode(&record).map_err(StoreError::Unavailable)?;

        let id = generate_id(self.id_length);
        deadline(self.op_timeout, self.backend.put(&note_key(&id), bytes, ttl)).await?;

        debug!(id = %id, views = ?remaining_views, ttl_secs = ttl.as_secs(), "stored note");
        Ok(id)
    }

    /// Read a note, consuming one view. Lookup, decrement, and the possible
    /// final deletion all happen inside a single backend `update`, so two
    /// concurrent readers can never both take the last view: one gets the
    /// ciphertext, the other gets `NotFound`.
    pub async fn consume_view(&self, id: &str) -> Result<Note, StoreError> {
        let key = note_key(id);
        let outcome = deadline(
            self.op_timeout,
            self.backend.update(&key, |current| {
                let Some(bytes) = current else {
                    return (Apply::Keep, Lookup::Missing);
                };
                let Ok(record) = model::decode(bytes) else {
                    return (Apply::Delete, Lookup::Corrupt);
                };
                match record.remaining_views {
                    // Unlimited views: the time bound alone governs
                    // visibility, nothing to mutate.
                    None => (Apply::Keep, Lookup::Found(record)),
                    // Cannot happen: the final read deletes on reaching
                    // zero. Drop the stray record and report nothing.
                    Some(0) => (Apply::Delete, Lookup::Missing),
                    // Last view: hand the ciphertext out and destroy.
                    Some(1) => (Apply::Delete, Lookup::Found(record)),
                    // Persist the decrement without touching the remaining
                    // expiry.
                    Some(n) => {
                        let mut updated = record.clone();
                        updated.remaining_views = Some(n - 1);
                        match model::encode(&updated) {
                            Ok(bytes) => (
                                Apply::Put {
                                    value: bytes,
                                    ttl: None,
                                },
                                Lookup::Found(updated),
                            ),
                            Err(_) => (Apply::Keep, Lookup::Corrupt),
                        }
                    }
                }
            }),
        )
        .await?;

        match outcome {
            Lookup::Found(record) => Ok(Note {
                ciphertext: record.ciphertext.clone(),
                meta: record.meta.clone(),
            }),
            Lookup::Corrupt => {
                warn!(id = %id, "dropped undecodable note record");
                Err(StoreError::NotFound)
            }
            Lookup::Missing => Err(StoreError::NotFound),
        }
    }

    /// Look at a note's metadata without consuming a view.
    pub async fn peek(&self, id: &str) -> Result<NotePreview, StoreError> {
        let key = note_key(id);
        let preview = deadline(
            self.op_timeout,
            self.backend.update(&key, |current| {
                let preview = current
                    .and_then(|bytes| model::decode(bytes).ok())
                    .map(|record| NotePreview {
                        meta: record.meta.clone(),
                        created_at: record.created_at,
                    });
                (Apply::Keep, preview)
            }),
        )
        .await?;
        preview.ok_or(StoreError::NotFound)
    }

    /// Remove a note. Deleting an id that is already gone is a no-op, so
    /// repeated deletion never errors.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let key = note_key(id);
        deadline(
            self.op_timeout,
            self.backend.update(&key, |_| (Apply::Delete, ())),
        )
        .await?;
        debug!(id = %id, "deleted note");
        Ok(())
    }

    /// Round-trip health probe: write a short-lived key, read it back, and
    /// compare.
    pub async fn ping(&self) -> Result<(), StoreError> {
        deadline(
            self.op_timeout,
            self.backend.put(PROBE_KEY, b"1".to_vec(), PROBE_TTL),
        )
        .await?;
        let ok = deadline(
            self.op_timeout,
            self.backend
                .update(PROBE_KEY, |current| (Apply::Keep, current == Some(&b"1"[..]))),
        )
        .await?;
        if ok {
            Ok(())
        } else {
            Err(StoreError::Unavailable(anyhow!(
                "probe round-trip mismatch"
            )))
        }
    }
}
