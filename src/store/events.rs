//! Change notifications for conversation-list observers.

use crate::core::ConversationStatus;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

/// Capacity of the notification channel.
pub(crate) const EVENT_CAPACITY: usize = 128;

/// Something changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conversation was created.
    Created {
        /// Conversation id.
        id: String,
    },
    /// A conversation's title or messages changed.
    Updated {
        /// Conversation id.
        id: String,
    },
    /// A conversation moved to a new status.
    StatusChanged {
        /// Conversation id.
        id: String,
        /// The new status.
        status: ConversationStatus,
    },
    /// Conversations were permanently removed.
    Purged {
        /// Removed ids.
        ids: Vec<String>,
    },
}

impl StoreEvent {
    /// Whether this event concerns the given conversation.
    #[must_use]
    pub fn concerns(&self, conversation_id: &str) -> bool {
        match self {
            Self::Created { id } | Self::Updated { id } | Self::StatusChanged { id, .. } => {
                id == conversation_id
            }
            Self::Purged { ids } => ids.iter().any(|id| id == conversation_id),
        }
    }
}

/// Handle returned by `ConversationStore::subscribe`.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<StoreEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. Returns `None` once the store is closed.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}
}
