//! Ephemeral note store. Clients hand over payloads they already encrypted;
//! the store keeps each one for a bounded number of reads and/or a bounded
//! time, then it is permanently gone. The HTTP layer that fronts this crate
//! lives elsewhere; [`NoteService`] is the boundary it calls.

pub mod config;
pub mod error;
pub mod limiter;
pub mod policy;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{BoundViolation, StoreError};
pub use limiter::{Action, RateLimiter};
pub use policy::ExpirationPolicy;
pub use service::{CreateRequest, Limits, NoteService};
pub use store::{Apply, AtomicStoreBackend, MemoryBackend, Note, NotePreview, NoteStore};
