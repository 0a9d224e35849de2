//! `parley new` command implementation.

use crate::config::Config;
use crate::error::Result;

/// Run the new command.
///
/// Creates an empty conversation and prints its id.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub fn run(config: &Config, title: Option<&str>) -> Result<()> {
    let store = super::open_store(config)?;
    let conversation = store.create(title)?;
    println!("{}", conversation.id);
    Ok(())
}
