//! Storage backends for conversation documents.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileBackend, SCHEMA_VERSION, get_parley_home};
pub use memory::MemoryBackend;
pub use traits::ConversationBackend;
