//! Storage trait definitions.

use crate::core::Conversation;
use crate::error::Result;

/// Persistent keyed storage for whole conversation documents.
///
/// Each `put` must be atomic for its record: a reader sees either the old
/// document or the new one, never a mix.
pub trait ConversationBackend: Send + Sync {
    /// Create or migrate the storage layout. Called once when a store opens.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be created or is from a newer
    /// version.
    fn upgrade(&self) -> Result<()>;

    /// Get a conversation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Save a conversation, replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn put(&self, conversation: &Conversation) -> Result<()>;

    /// Delete a conversation. Deleting a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, id: &str) -> Result<()>;

    /// Load every readable conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn load_all(&self) -> Result<Vec<Conversation>>;
}
