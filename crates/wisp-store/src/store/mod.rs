pub mod backend;
pub mod memory;
pub mod model;
pub mod notes;

pub use backend::{Apply, AtomicStoreBackend};
pub use memory::MemoryBackend;
pub use model::{Note, NotePreview, NoteRecord};
pub use notes::NoteStore;
