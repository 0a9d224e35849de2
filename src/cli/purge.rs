//! `parley purge`, `parley sweep` and `parley clear` implementations.

use crate::config::Config;
use crate::core::ConversationStatus;
use crate::error::{Error, Result};

/// Run the purge command: delete one conversation permanently.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the conversation is not
/// found.
pub fn run(config: &Config, id: &str) -> Result<()> {
    let store = super::open_store(config)?;
    if !store.purge(id)? {
        return Err(Error::NotFound(format!("conversation {id}")));
    }
    println!("Purged {id}.");
    Ok(())
}

/// Run the sweep command: delete conversations whose retention expired.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub fn sweep(config: &Config) -> Result<()> {
    let store = super::open_store(config)?;
    let removed = store.purge_expired(store.now())?;
    report(removed.len());
    Ok(())
}

/// Run the clear command: delete every conversation, or every conversation
/// with one status. Does nothing unless `confirmed`.
///
/// # Errors
///
/// Returns an error if the storage backend fails or `status` is not a
/// known status.
pub fn clear(config: &Config, status: Option<&str>, confirmed: bool) -> Result<()> {
    let filter = status.map(str::parse::<ConversationStatus>).transpose()?;
    if !confirmed {
        let scope = filter.map_or_else(|| "all".to_string(), |s| format!("all {s}"));
        println!("This permanently deletes {scope} conversations. Re-run with --yes to confirm.");
        return Ok(());
    }

    let store = super::open_store(config)?;
    let removed = store.clear(filter)?;
    report(removed.len());
    Ok(())
}

fn report(removed: usize) {
    if removed == 0 {
        println!("No conversations to purge.");
    } else {
        println!("Purged {removed} conversation(s).");
    }
}
