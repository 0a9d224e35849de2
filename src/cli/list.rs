//! `parley list` command implementation.

use super::format_local_time;
use crate::config::Config;
use crate::core::{Conversation, ConversationStatus};
use crate::error::Result;
use crate::store::ConversationStore;

/// Default number of conversations to show.
const DEFAULT_LIMIT: usize = 20;

/// Run the list command.
///
/// Shows conversations, most recently updated first. Expired archived and
/// trashed conversations are purged before listing.
///
/// # Errors
///
/// Returns an error if the storage backend fails or `status` is not a
/// known status.
pub fn run(config: &Config, status: Option<&str>, limit: Option<usize>) -> Result<()> {
    let filter = status.map(str::parse::<ConversationStatus>).transpose()?;
    let store = super::open_store(config)?;
    let conversations = recent(&store, filter, limit.unwrap_or(DEFAULT_LIMIT))?;

    if conversations.is_empty() {
        println!("No conversations found.");
        println!("\nConversations are stored in: {}", config.storage.path.display());
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<18} {:>5}  Title",
        "Conversation ID", "Status", "Updated", "Msgs"
    );
    println!("{}", "─".repeat(90));

    for conv in &conversations {
        println!(
            "{:<38} {:<10} {:<18} {:>5}  {}",
            conv.id,
            conv.status,
            format_local_time(conv.updated_at),
            conv.messages.len(),
            conv.title
        );
    }

    println!("{}", "─".repeat(90));
    println!("Showing {} conversation(s)", conversations.len());

    Ok(())
}

/// The `limit` most recent conversations matching `filter`.
fn recent(
    store: &ConversationStore,
    filter: Option<ConversationStatus>,
    limit: usize,
) -> Result<Vec<Conversation>> {
    let mut conversations = store.list(filter)?;
    conversations.truncate(limit);
    Ok(conversations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RetentionConfig;
    use crate::storage::MemoryBackend;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn store() -> (ConversationStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = ConversationStore::open(
            Arc::new(MemoryBackend::new()),
            clock.clone(),
            RetentionConfig::new(7),
        )
        .unwrap();
        (store, clock)
    }

    #[test]
    fn list_respects_limit_and_order() {
        let (store, clock) = store();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.create(Some(&format!("chat {i}"))).unwrap().id);
            clock.advance(Duration::seconds(1));
        }

        let listed = recent(&store, None, 3).unwrap();
        let titles: Vec<&str> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["chat 4", "chat 3", "chat 2"]);
    }

    #[test]
    fn list_filters_by_status() {
        let (store, _) = store();
        let kept = store.create(None).unwrap();
        let archived = store.create(None).unwrap();
        store
            .set_status(&archived.id, ConversationStatus::Archived)
            .unwrap();

        let listed = recent(&store, Some(ConversationStatus::Archived), 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, archived.id);
        assert_ne!(listed[0].id, kept.id);
    }

    #[test]
    fn list_hides_expired_conversations() {
        let (store, clock) = store();
        let trashed = store.create(None).unwrap();
        store
            .set_status(&trashed.id, ConversationStatus::Trashed)
            .unwrap();
        clock.advance(Duration::days(8));

        assert!(recent(&store, None, 10).unwrap().is_empty());
        assert!(store.get(&trashed.id).unwrap().is_none());
    }
}
