//! `parley archive`, `parley trash` and `parley restore` implementations.

use crate::config::Config;
use crate::core::ConversationStatus;
use crate::error::Result;

/// Run a status change command.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the conversation is not
/// found.
pub fn run(config: &Config, id: &str, status: ConversationStatus) -> Result<()> {
    let store = super::open_store(config)?;
    let conversation = super::found(id, store.set_status(id, status)?)?;

    match status {
        ConversationStatus::Active => println!("Restored {}.", conversation.id),
        _ => println!(
            "Moved {} to {}. It will be purged after {} day(s).",
            conversation.id,
            status,
            store.retention().retention_days
        ),
    }
    Ok(())
}
