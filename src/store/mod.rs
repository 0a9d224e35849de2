//! The conversation store: single source of truth for conversations.
//!
//! An in-memory view over a [`ConversationBackend`]. Every mutation clones
//! the cached record, applies the change, persists the whole document, and
//! only then swaps it into the view, so a failed write never leaves the
//! view ahead of storage. Mutations are serialized by one lock, which is
//! never held across an `.await`.

pub mod events;

pub use events::{StoreEvent, Subscription};

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::core::{
    Conversation, ConversationStatus, DEFAULT_TITLE, Message, MessagePatch, MessageStatus, Role,
    derive_title,
};
use crate::error::{Error, Result};
use crate::storage::ConversationBackend;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Content written into a reply that was cut off by a previous shutdown.
const INTERRUPTED_TEXT: &str = "Response interrupted.";

/// Durable keyed collection of conversations.
pub struct ConversationStore {
    backend: Arc<dyn ConversationBackend>,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, Conversation>>,
    retention: Mutex<RetentionConfig>,
    events: Mutex<Option<broadcast::Sender<StoreEvent>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("conversations", &self.lock_records().len())
            .field("retention", &self.retention())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    /// Open a store over `backend`.
    ///
    /// Runs the backend's schema upgrade, loads every record, and finalizes
    /// replies that were still open when the previous process stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be upgraded or read, or a
    /// repaired record cannot be written back.
    pub fn open(
        backend: Arc<dyn ConversationBackend>,
        clock: Arc<dyn Clock>,
        retention: RetentionConfig,
    ) -> Result<Self> {
        backend.upgrade()?;

        let mut records = HashMap::new();
        for mut conversation in backend.load_all()? {
            if repair_interrupted(&mut conversation) {
                warn!(id = %conversation.id, "finalized interrupted reply");
                backend.put(&conversation)?;
            }
            records.insert(conversation.id.clone(), conversation);
        }
        info!(count = records.len(), "conversation store opened");

        let (tx, _) = broadcast::channel(events::EVENT_CAPACITY);
        Ok(Self {
            backend,
            clock,
            records: Mutex::new(records),
            retention: Mutex::new(retention.clamped()),
            events: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        })
    }

    /// Close the store. Later operations fail with [`Error::StoreClosed`]
    /// and subscribers see the end of their stream.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("conversation store closed");
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.as_ref() {
            Some(tx) => Subscription::new(tx.subscribe()),
            // Closed: hand out a receiver whose sender is already gone.
            None => Subscription::new(broadcast::channel(1).1),
        }
    }

    /// Current retention settings.
    #[must_use]
    pub fn retention(&self) -> RetentionConfig {
        *self.retention.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the retention window. Values below one day are clamped.
    pub fn set_retention_days(&self, days: u32) -> RetentionConfig {
        let clamped = RetentionConfig::new(days);
        *self.retention.lock().unwrap_or_else(PoisonError::into_inner) = clamped;
        clamped
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a new active conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// written.
    pub fn create(&self, title: Option<&str>) -> Result<Conversation> {
        self.ensure_open()?;
        let conversation = Conversation::new(title, self.clock.now());

        let mut records = self.lock_records();
        self.backend.put(&conversation)?;
        records.insert(conversation.id.clone(), conversation.clone());
        drop(records);

        debug!(id = %conversation.id, "created conversation");
        self.notify(StoreEvent::Created {
            id: conversation.id.clone(),
        });
        Ok(conversation)
    }

    /// Get a conversation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    pub fn get(&self, id: &str) -> Result<Option<Conversation>> {
        self.ensure_open()?;
        Ok(self.lock_records().get(id).cloned())
    }

    /// List conversations, most recently updated first.
    ///
    /// Runs the retention sweep first, so expired records are never
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the sweep cannot delete
    /// an expired record.
    pub fn list(&self, filter: Option<ConversationStatus>) -> Result<Vec<Conversation>> {
        self.ensure_open()?;
        self.purge_expired(self.clock.now())?;

        let records = self.lock_records();
        let mut conversations: Vec<Conversation> = records
            .values()
            .filter(|c| filter.is_none_or(|status| c.status == status))
            .cloned()
            .collect();
        drop(records);

        conversations.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(conversations)
    }

    /// Rename a conversation. A blank title restores the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// written.
    pub fn rename(&self, id: &str, title: &str) -> Result<Option<Conversation>> {
        let title = title.trim();
        self.mutate(id, |conv, _| {
            if title.is_empty() {
                conv.title = DEFAULT_TITLE.to_string();
                conv.title_locked = false;
            } else {
                conv.title = title.to_string();
                conv.title_locked = true;
            }
            Some(StoreEvent::Updated {
                id: conv.id.clone(),
            })
        })
    }

    /// Append a message to the end of a conversation.
    ///
    /// The first user message names an untitled conversation. The message's
    /// `created_at` is restamped from the store clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// written.
    pub fn append_message(&self, id: &str, message: Message) -> Result<Option<Conversation>> {
        self.mutate(id, |conv, now| {
            let mut message = message;
            message.created_at = now;
            let first_user = message.role == Role::User
                && !conv.messages.iter().any(|m| m.role == Role::User);
            if first_user && !conv.title_locked {
                if let Some(title) = derive_title(&message.content) {
                    conv.title = title;
                }
            }
            conv.messages.push(message);
            Some(StoreEvent::Updated {
                id: conv.id.clone(),
            })
        })
    }

    /// Merge `patch` onto one message.
    ///
    /// A missing message is a no-op that returns the unmodified
    /// conversation; messages are never created here.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// written.
    pub fn update_message(
        &self,
        id: &str,
        message_id: &str,
        patch: MessagePatch,
    ) -> Result<Option<Conversation>> {
        self.mutate(id, |conv, _| {
            let message = conv.messages.iter_mut().find(|m| m.id == message_id)?;
            message.apply(patch);
            Some(StoreEvent::Updated {
                id: conv.id.clone(),
            })
        })
    }

    /// Move a conversation to a new status.
    ///
    /// Entering a retained status starts its retention window; returning to
    /// `Active` clears it. Setting the current status again changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// written.
    pub fn set_status(&self, id: &str, status: ConversationStatus) -> Result<Option<Conversation>> {
        self.mutate(id, |conv, now| {
            if conv.status == status {
                return None;
            }
            conv.status = status;
            conv.status_changed_at = status.is_retained().then_some(now);
            Some(StoreEvent::StatusChanged {
                id: conv.id.clone(),
                status,
            })
        })
    }

    /// Permanently delete a conversation. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the record cannot be
    /// deleted.
    pub fn purge(&self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let mut records = self.lock_records();
        if !records.contains_key(id) {
            return Ok(false);
        }
        self.backend.delete(id)?;
        records.remove(id);
        drop(records);

        info!(id, "purged conversation");
        self.notify(StoreEvent::Purged {
            ids: vec![id.to_string()],
        });
        Ok(true)
    }

    /// Delete every archived or trashed conversation whose retention window
    /// has elapsed at `now`. Returns the removed ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a record cannot be
    /// deleted. Records removed before the failure stay removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.ensure_open()?;
        let window = self.retention().window();
        self.remove_where(|conv| conv.retention_anchor().is_some_and(|at| now - at >= window))
    }

    /// Delete every conversation, or every conversation with one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a record cannot be
    /// deleted.
    pub fn clear(&self, filter: Option<ConversationStatus>) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.remove_where(|conv| filter.is_none_or(|status| conv.status == status))
    }

    fn remove_where<P>(&self, predicate: P) -> Result<Vec<String>>
    where
        P: Fn(&Conversation) -> bool,
    {
        let mut records = self.lock_records();
        let mut doomed: Vec<String> = records
            .values()
            .filter(|c| predicate(c))
            .map(|c| c.id.clone())
            .collect();
        doomed.sort();

        let mut removed = Vec::with_capacity(doomed.len());
        let mut failure = None;
        for id in doomed {
            match self.backend.delete(&id) {
                Ok(()) => {
                    records.remove(&id);
                    removed.push(id);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(records);

        if !removed.is_empty() {
            info!(count = removed.len(), "purged conversations");
            self.notify(StoreEvent::Purged {
                ids: removed.clone(),
            });
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Apply `change` to a copy of the record, persist it, then commit.
    ///
    /// `change` returns the event to publish, or `None` when it left the
    /// record untouched (no write happens).
    fn mutate<F>(&self, id: &str, change: F) -> Result<Option<Conversation>>
    where
        F: FnOnce(&mut Conversation, DateTime<Utc>) -> Option<StoreEvent>,
    {
        self.ensure_open()?;
        let mut records = self.lock_records();
        let Some(current) = records.get(id) else {
            return Ok(None);
        };

        let mut next = current.clone();
        let now = self.clock.now();
        let Some(event) = change(&mut next, now) else {
            return Ok(Some(next));
        };
        next.updated_at = now;

        self.backend.put(&next)?;
        records.insert(id.to_string(), next.clone());
        drop(records);

        self.notify(event);
        Ok(Some(next))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, Conversation>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: StoreEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

/// Finalize replies left open by a previous process. Returns whether
/// anything changed.
fn repair_interrupted(conversation: &mut Conversation) -> bool {
    let mut changed = false;
    for message in conversation.messages.iter_mut().filter(|m| m.is_open()) {
        let mut patch = MessagePatch::status(MessageStatus::Error);
        patch.error = Some("interrupted".to_string());
        if message.content.is_empty() {
            patch.content = Some(INTERRUPTED_TEXT.to_string());
        }
        message.apply(patch);
        changed = true;
    }
    changed
}
