use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in the backend as bincode-encoded bytes, one record per note id.
/// The ciphertext was encrypted by the client before it ever reached us and
/// is handed back byte-for-byte; expiry is store-level TTL, not a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct NoteRecord {
    /// Opaque payload. Never inspected or transformed.
    pub ciphertext: Vec<u8>,
    /// Small client-supplied blob (key hints, filenames). Also opaque.
    pub meta: String,
    /// Reads left before the note self-destructs. `None` means unlimited
    /// views, time-bound only.
    pub remaining_views: Option<u32>,
    /// Unix timestamp (seconds). Diagnostic only, never drives logic.
    pub created_at: i64,
}

/// What a successful read hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub ciphertext: Vec<u8>,
    pub meta: String,
}

/// Metadata visible without consuming a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePreview {
    pub meta: String,
    pub created_at: i64,
}

pub(crate) fn encode(record: &NoteRecord) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode note")
}

pub(crate) fn decode(bytes: &[u8]) -> Result<NoteRecord> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode note")?;
    Ok(record)
}
