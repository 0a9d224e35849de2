//! Core types: the conversation model and the composer state machine.

pub mod composer;
pub mod conversation;

pub use composer::{Composer, ComposerAction, ComposerState, transition};
pub use conversation::{
    Attachment, Conversation, ConversationStatus, DEFAULT_TITLE, Message, MessagePatch,
    MessageStatus, Role, derive_title,
};
