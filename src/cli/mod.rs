//! CLI command implementations.

pub mod create;
pub mod list;
pub mod purge;
pub mod rename;
pub mod send;
pub mod show;
pub mod status;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::core::Conversation;
use crate::error::{Error, Result};
use crate::storage::FileBackend;
use crate::store::ConversationStore;
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;

/// Open the configured on-disk store.
///
/// # Errors
///
/// Returns an error if the storage directory cannot be prepared or read.
pub fn open_store(config: &Config) -> Result<Arc<ConversationStore>> {
    let backend = FileBackend::new(config.storage.path.clone());
    let store = ConversationStore::open(
        Arc::new(backend),
        Arc::new(SystemClock::new()),
        config.retention,
    )?;
    Ok(Arc::new(store))
}

/// Fetch a conversation or fail with [`Error::NotFound`].
fn require(store: &ConversationStore, id: &str) -> Result<Conversation> {
    store
        .get(id)?
        .ok_or_else(|| Error::NotFound(format!("conversation {id}")))
}

/// Map a missing record after a mutation to [`Error::NotFound`].
fn found(id: &str, conversation: Option<Conversation>) -> Result<Conversation> {
    conversation.ok_or_else(|| Error::NotFound(format!("conversation {id}")))
}

/// Format UTC time as local time for display.
fn format_local_time(utc: DateTime<Utc>) -> String {
    let local: DateTime<Local> = utc.into();
    local.format("%Y-%m-%d %H:%M").to_string()
}
