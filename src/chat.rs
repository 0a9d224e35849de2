//! Send, retry and cancel: the user-facing entry points.
//!
//! [`ChatService`] sequences one exchange: composer check, user message,
//! placeholder, pipeline, composer reset. It keeps one composer and at most
//! one in-flight reply per conversation.
//!
//! A reply whose pipeline stopped on a storage error stays open in the
//! store's view. The service remembers it as stranded: it no longer blocks
//! sending, `retry` refills it in place, and the next `send` settles it.

use crate::core::{
    Attachment, Composer, ComposerAction, Conversation, Message, MessagePatch, MessageStatus, Role,
};
use crate::error::Result;
use crate::ingest::{
    CancelHandle, ChatRequest, FAILURE_TEXT, IngestOutcome, Pipeline, Target, Transport,
};
use crate::store::ConversationStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Why a send was refused before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No conversation with that id.
    ConversationMissing,
    /// No text and no attachments, or no user message to retry.
    NothingToSend,
    /// The conversation already has a pending or streaming reply.
    ReplyInFlight,
    /// The composer is sending, responding or listening.
    ComposerBusy,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::ConversationMissing => "conversation not found",
            Self::NothingToSend => "nothing to send",
            Self::ReplyInFlight => "a reply is already in progress",
            Self::ComposerBusy => "composer is busy",
        };
        f.write_str(reason)
    }
}

/// Result of a send or retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The exchange ran; the pipeline ended this way.
    Delivered(IngestOutcome),
    /// Nothing was written.
    Rejected(Rejection),
}

/// Chat entry points over a shared store.
pub struct ChatService {
    store: Arc<ConversationStore>,
    pipeline: Pipeline,
    composers: Mutex<HashMap<String, Composer>>,
    inflight: Mutex<HashMap<String, CancelHandle>>,
    stranded: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("store", &self.store)
            .field("inflight", &self.lock_inflight().len())
            .finish_non_exhaustive()
    }
}

impl ChatService {
    /// Create a service.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            pipeline: Pipeline::new(store.clone(), transport),
            store,
            composers: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            stranded: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Send a user message and stream the reply into a new placeholder.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a write fails. The
    /// composer is left in its error state.
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<SendOutcome> {
        let Some(conversation) = self.store.get(conversation_id)? else {
            self.forget(conversation_id);
            return Ok(SendOutcome::Rejected(Rejection::ConversationMissing));
        };

        let has_text = !text.trim().is_empty();
        let has_attachments = !attachments.is_empty();
        {
            let mut composers = self.lock_composers();
            let composer = composers.entry(conversation_id.to_string()).or_default();
            composer.dispatch(ComposerAction::SetInputs {
                has_text,
                has_attachments,
            });
            if !has_text && !has_attachments {
                return Ok(SendOutcome::Rejected(Rejection::NothingToSend));
            }
            if self.reply_in_flight(&conversation) {
                return Ok(SendOutcome::Rejected(Rejection::ReplyInFlight));
            }
            if !composer.can_send() {
                return Ok(SendOutcome::Rejected(Rejection::ComposerBusy));
            }
            composer.dispatch(ComposerAction::StartSending);
        }

        let prompt = Message::user(text, attachments);
        let prompt_id = prompt.id.clone();
        let placeholder = Message::placeholder();
        let target = Target::new(conversation_id, placeholder.id.clone());

        let appended = self
            .release_stranded(&conversation)
            .and_then(|()| self.store.append_message(conversation_id, prompt))
            .and_then(|_| self.store.append_message(conversation_id, placeholder));
        let conversation = match appended {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                self.forget(conversation_id);
                return Ok(SendOutcome::Rejected(Rejection::ConversationMissing));
            }
            Err(e) => {
                warn!(conversation = conversation_id, error = %e, "failed to record message");
                self.dispatch(conversation_id, ComposerAction::SetError(e.to_string()));
                return Err(e);
            }
        };
        debug!(conversation = conversation_id, "user message recorded");

        let request = ChatRequest::for_prompt(&conversation, &prompt_id);
        self.deliver(&target, &request)
            .await
            .map(SendOutcome::Delivered)
    }

    /// Ask again for a reply to the latest user message.
    ///
    /// A trailing failed or stranded reply is reset and refilled in place;
    /// otherwise a new placeholder is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a write fails.
    pub async fn retry(&self, conversation_id: &str) -> Result<SendOutcome> {
        let Some(conversation) = self.store.get(conversation_id)? else {
            self.forget(conversation_id);
            return Ok(SendOutcome::Rejected(Rejection::ConversationMissing));
        };
        if self.reply_in_flight(&conversation) {
            return Ok(SendOutcome::Rejected(Rejection::ReplyInFlight));
        }
        let Some(prompt_id) = conversation.last_user_message().map(|m| m.id.clone()) else {
            return Ok(SendOutcome::Rejected(Rejection::NothingToSend));
        };
        {
            let mut composers = self.lock_composers();
            let composer = composers.entry(conversation_id.to_string()).or_default();
            if composer.is_busy() {
                return Ok(SendOutcome::Rejected(Rejection::ComposerBusy));
            }
            composer.dispatch(ComposerAction::StartSending);
        }

        let stranded = self.lock_stranded().get(conversation_id).cloned();
        let reusable = conversation
            .messages
            .last()
            .filter(|m| {
                m.role == Role::Assistant
                    && (m.status == Some(MessageStatus::Error)
                        || stranded.as_deref() == Some(m.id.as_str()))
            })
            .map(|m| m.id.clone());

        let (target, written) = match reusable {
            Some(message_id) => {
                debug!(conversation = conversation_id, "reusing failed reply");
                let written =
                    self.store
                        .update_message(conversation_id, &message_id, MessagePatch::restart());
                (Target::new(conversation_id, message_id), written)
            }
            None => {
                let placeholder = Message::placeholder();
                let target = Target::new(conversation_id, placeholder.id.clone());
                let written = self
                    .release_stranded(&conversation)
                    .and_then(|()| self.store.append_message(conversation_id, placeholder));
                (target, written)
            }
        };
        let conversation = match written {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                self.forget(conversation_id);
                return Ok(SendOutcome::Rejected(Rejection::ConversationMissing));
            }
            Err(e) => {
                self.dispatch(conversation_id, ComposerAction::SetError(e.to_string()));
                return Err(e);
            }
        };

        let request = ChatRequest::for_prompt(&conversation, &prompt_id);
        self.deliver(&target, &request)
            .await
            .map(SendOutcome::Delivered)
    }

    /// Cancel the in-flight reply for a conversation. Returns whether one
    /// was running.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.lock_inflight().get(conversation_id) {
            Some(handle) => {
                handle.cancel();
                info!(conversation = conversation_id, "cancel requested");
                true
            }
            None => false,
        }
    }

    /// Whether a send would be accepted right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    pub fn can_send(&self, conversation_id: &str) -> Result<bool> {
        let Some(conversation) = self.store.get(conversation_id)? else {
            self.forget(conversation_id);
            return Ok(false);
        };
        Ok(self.composer(conversation_id).can_send() && !self.reply_in_flight(&conversation))
    }

    /// Apply a composer action. Returns the new composer.
    pub fn dispatch(&self, conversation_id: &str, action: ComposerAction) -> Composer {
        let mut composers = self.lock_composers();
        let composer = composers.entry(conversation_id.to_string()).or_default();
        composer.dispatch(action);
        composer.clone()
    }

    /// Current composer for a conversation.
    #[must_use]
    pub fn composer(&self, conversation_id: &str) -> Composer {
        self.lock_composers()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn deliver(&self, target: &Target, request: &ChatRequest) -> Result<IngestOutcome> {
        let id = target.conversation_id.as_str();
        let cancel = CancelHandle::new();
        self.lock_inflight().insert(id.to_string(), cancel.clone());
        self.lock_stranded().remove(id);

        let result = self
            .pipeline
            .run(target, request, &cancel, || {
                self.dispatch(id, ComposerAction::StartResponding);
            })
            .await;

        self.lock_inflight().remove(id);
        match &result {
            Ok(outcome) => {
                debug!(conversation = id, ?outcome, "exchange finished");
                self.dispatch(id, ComposerAction::Reset);
            }
            Err(e) => {
                warn!(conversation = id, error = %e, "exchange aborted, reply stranded");
                self.lock_stranded()
                    .insert(id.to_string(), target.message_id.clone());
                self.dispatch(id, ComposerAction::SetError(e.to_string()));
            }
        }
        result
    }

    /// Whether an open reply in `conversation` is still being filled by
    /// some exchange. A stranded reply does not count.
    fn reply_in_flight(&self, conversation: &Conversation) -> bool {
        let stranded = self.lock_stranded().get(&conversation.id).cloned();
        conversation
            .messages
            .iter()
            .any(|m| m.is_open() && stranded.as_deref() != Some(m.id.as_str()))
    }

    /// Close a stranded reply as failed before a new exchange starts.
    fn release_stranded(&self, conversation: &Conversation) -> Result<()> {
        let Some(message_id) = self.lock_stranded().get(&conversation.id).cloned() else {
            return Ok(());
        };
        if let Some(message) = conversation.message(&message_id).filter(|m| m.is_open()) {
            let mut patch = MessagePatch::status(MessageStatus::Error);
            patch.error = Some("interrupted".to_string());
            if message.content.is_empty() {
                patch.content = Some(FAILURE_TEXT.to_string());
            }
            self.store
                .update_message(&conversation.id, &message_id, patch)?;
        }
        debug!(conversation = %conversation.id, "stranded reply released");
        self.lock_stranded().remove(&conversation.id);
        Ok(())
    }

    /// Drop per-conversation state for a conversation that no longer exists.
    fn forget(&self, conversation_id: &str) {
        self.lock_composers().remove(conversation_id);
        self.lock_stranded().remove(conversation_id);
    }

    fn lock_composers(&self) -> MutexGuard<'_, HashMap<String, Composer>> {
        self.composers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, CancelHandle>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stranded(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.stranded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
