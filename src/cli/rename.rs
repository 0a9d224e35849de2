//! `parley rename` command implementation.

use crate::config::Config;
use crate::error::Result;

/// Run the rename command.
///
/// A blank title restores the default and lets the next user message name
/// the conversation again.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the conversation is not
/// found.
pub fn run(config: &Config, id: &str, title: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let conversation = super::found(id, store.rename(id, title)?)?;
    println!("Renamed {} to \"{}\".", conversation.id, conversation.title);
    Ok(())
}
