//! `parley show` command implementation.

use super::format_local_time;
use crate::config::Config;
use crate::core::{Conversation, Message, MessageStatus, Role};
use crate::error::Result;
use std::fmt::Write;

/// Run the show command.
///
/// Prints a conversation transcript, or the raw JSON document with `json`.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the conversation is not
/// found.
pub fn run(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let conversation = super::require(&store, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
    } else {
        print!("{}", render(&conversation));
    }
    Ok(())
}

/// Render a conversation as a plain-text transcript.
fn render(conv: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", conv.title);
    let _ = writeln!(
        out,
        "{} | {} | created {} | updated {}",
        conv.id,
        conv.status,
        format_local_time(conv.created_at),
        format_local_time(conv.updated_at)
    );
    if let Some(at) = conv.status_changed_at {
        let _ = writeln!(out, "status changed {}", format_local_time(at));
    }
    let _ = writeln!(out, "{}", "─".repeat(60));

    if conv.messages.is_empty() {
        let _ = writeln!(out, "(no messages)");
    }
    for message in &conv.messages {
        render_message(&mut out, message);
    }
    out
}

fn render_message(out: &mut String, message: &Message) {
    let _ = writeln!(out, "[{}]{}", role_label(message.role), status_suffix(message.status));
    for line in message.content.lines() {
        let _ = writeln!(out, "  {line}");
    }
    for attachment in &message.attachments {
        let _ = writeln!(
            out,
            "  + {} ({}, {} bytes)",
            attachment.name, attachment.kind, attachment.size
        );
    }
    if !message.auxiliary_answers.is_empty() {
        let sources: Vec<&str> = message.auxiliary_answers.keys().map(String::as_str).collect();
        let _ = writeln!(out, "  sources: {}", sources.join(", "));
    }
    if let Some(error) = &message.error {
        let _ = writeln!(out, "  error: {error}");
    }
    out.push('\n');
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn status_suffix(status: Option<MessageStatus>) -> &'static str {
    match status {
        None | Some(MessageStatus::Sent) => "",
        Some(MessageStatus::Pending) => " (pending)",
        Some(MessageStatus::Streaming) => " (streaming)",
        Some(MessageStatus::Error) => " (failed)",
    }
}
