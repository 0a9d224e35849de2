//! Conversation and message types.

use crate::clock::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Title used until one is derived or set.
pub const DEFAULT_TITLE: &str = "New chat";

/// Maximum characters kept when deriving a title from a message.
const TITLE_LEN: usize = 48;

/// A titled, timestamped thread of messages stored as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier, never reused.
    pub id: String,

    /// Display title.
    pub title: String,

    /// Whether the title was set explicitly (disables auto-derivation).
    #[serde(default)]
    pub title_locked: bool,

    /// Lifecycle status.
    pub status: ConversationStatus,

    /// When the conversation was created.
    pub created_at: DateTime<Utc>,

    /// When the conversation was last mutated.
    pub updated_at: DateTime<Utc>,

    /// When the conversation entered its current retained status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,

    /// Messages in order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty active conversation.
    #[must_use]
    pub fn new(title: Option<&str>, now: DateTime<Utc>) -> Self {
        let (title, title_locked) = match title.map(str::trim) {
            Some(t) if !t.is_empty() => (t.to_string(), true),
            _ => (DEFAULT_TITLE.to_string(), false),
        };
        Self {
            id: new_id(),
            title,
            title_locked,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            status_changed_at: None,
            messages: Vec::new(),
        }
    }

    /// Look up a message by id.
    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// The assistant reply currently being filled, if any.
    #[must_use]
    pub fn open_reply(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_open())
    }

    /// Whether an assistant reply is pending or streaming.
    #[must_use]
    pub fn has_open_reply(&self) -> bool {
        self.open_reply().is_some()
    }

    /// The most recent user message.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// When the current retention window started.
    ///
    /// Falls back to `updated_at` for records written before the status
    /// stamp existed.
    #[must_use]
    pub fn retention_anchor(&self) -> Option<DateTime<Utc>> {
        if !self.status.is_retained() {
            return None;
        }
        Some(self.status_changed_at.unwrap_or(self.updated_at))
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Visible in the main list.
    #[default]
    Active,
    /// Hidden from the main list, kept until retention expires.
    Archived,
    /// In the trash, kept until retention expires.
    Trashed,
    /// Terminal label before purge; retained like `Trashed`.
    Deleted,
}

impl ConversationStatus {
    /// Whether conversations in this status are subject to the retention sweep.
    #[must_use]
    pub fn is_retained(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Lowercase name, as used on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Trashed => "trashed",
            Self::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" | "archive" => Ok(Self::Archived),
            "trashed" | "trash" => Ok(Self::Trashed),
            "deleted" => Ok(Self::Deleted),
            other => Err(crate::error::Error::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person using the app.
    User,
    /// The remote assistant.
    Assistant,
    /// Injected instructions or notices.
    System,
}

/// Delivery status of an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder appended; nothing received yet.
    Pending,
    /// Reply is arriving.
    Streaming,
    /// Reply complete.
    Sent,
    /// Reply failed or was cancelled.
    Error,
}

impl MessageStatus {
    /// Whether the message is still being filled.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Streaming)
    }
}

/// Lightweight reference to an attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name shown to the user.
    pub name: String,

    /// Kind of content (e.g. `image`, `pdf`, `text`).
    pub kind: String,

    /// Size in bytes.
    pub size: u64,

    /// Where the file came from (path or URL).
    pub source: String,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique within the conversation.
    pub id: String,

    /// Author.
    pub role: Role,

    /// Plain-text content.
    pub content: String,

    /// Delivery status (assistant messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,

    /// Attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Per-source auxiliary answers delivered alongside the reply.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auxiliary_answers: BTreeMap<String, Value>,

    /// Audit events delivered alongside the reply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_events: Vec<Value>,

    /// Short diagnostic when the reply failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the message was created. The store restamps it on append.
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: new_id(),
            role,
            content,
            status: None,
            attachments: Vec::new(),
            auxiliary_answers: BTreeMap::new(),
            audit_events: Vec::new(),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A message authored by the user.
    #[must_use]
    pub fn user(content: &str, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::with_role(Role::User, content.to_string());
        msg.attachments = attachments;
        msg
    }

    /// An empty assistant message awaiting its reply.
    #[must_use]
    pub fn placeholder() -> Self {
        let mut msg = Self::with_role(Role::Assistant, String::new());
        msg.status = Some(MessageStatus::Pending);
        msg
    }

    /// A system notice.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content.to_string())
    }

    /// Whether this is an assistant reply still being filled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.is_some_and(MessageStatus::is_open)
    }

    /// Merge a patch onto this message.
    pub fn apply(&mut self, patch: MessagePatch) {
        if patch.reset {
            self.content.clear();
            self.auxiliary_answers.clear();
            self.audit_events.clear();
            self.error = None;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(answers) = patch.auxiliary_answers {
            self.auxiliary_answers.extend(answers);
        }
        if let Some(events) = patch.audit_events {
            self.audit_events.extend(events);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
    }
}

/// Partial update for a message. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    /// Replacement content.
    pub content: Option<String>,
    /// New status.
    pub status: Option<MessageStatus>,
    /// Answers merged key-wise into the existing map.
    pub auxiliary_answers: Option<BTreeMap<String, Value>>,
    /// Events appended to the existing list.
    pub audit_events: Option<Vec<Value>>,
    /// Diagnostic to record.
    pub error: Option<String>,
    /// Clear content, side channels and error before applying the rest.
    pub reset: bool,
}

impl MessagePatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that replaces content and sets the status.
    #[must_use]
    pub fn content(content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            content: Some(content.into()),
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that returns a failed reply to a fresh pending placeholder.
    #[must_use]
    pub fn restart() -> Self {
        Self {
            status: Some(MessageStatus::Pending),
            reset: true,
            ..Self::default()
        }
    }
}

/// Derive a display title from message text.
///
/// Uses the first non-empty line, cut to a fixed number of characters.
#[must_use]
pub fn derive_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() > TITLE_LEN {
        let cut: String = line.chars().take(TITLE_LEN).collect();
        Some(format!("{}...", cut.trim_end()))
    } else {
        Some(line.to_string())
    }
}
