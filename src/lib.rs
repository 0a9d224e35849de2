//! parley - local chat conversations with streaming replies.
//!
//! A durable conversation store with an archive/trash lifecycle and
//! retention sweep, a pipeline that streams server-sent replies into it,
//! and the composer state machine that gates sending.

pub mod chat;
pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod storage;
pub mod store;

pub use chat::{ChatService, Rejection, SendOutcome};
pub use config::Config;
pub use error::{Error, Result};
pub use store::ConversationStore;
