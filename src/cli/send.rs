//! `parley send` and `parley retry` implementations.
//!
//! The reply is echoed to stdout as it streams in. Ctrl-C cancels it.

use crate::chat::{ChatService, Rejection, SendOutcome};
use crate::config::Config;
use crate::core::{Attachment, Role};
use crate::error::{Error, Result};
use crate::ingest::{HttpTransport, IngestOutcome};
use crate::store::{ConversationStore, StoreEvent, Subscription};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum Request {
    Send {
        text: String,
        attachments: Vec<Attachment>,
    },
    Retry,
}

/// Reply message the echo is following, and how many bytes of it were
/// printed.
#[derive(Debug, Default)]
struct Echoed {
    message_id: Option<String>,
    printed: usize,
}

/// Run the send command.
///
/// # Errors
///
/// Returns an error if an attachment cannot be read, the conversation is
/// missing, the send is refused, storage fails, or the reply fails.
pub async fn run(config: &Config, id: &str, text: &str, attach: &[PathBuf]) -> Result<()> {
    let attachments = attach
        .iter()
        .map(|path| attachment_from_path(path))
        .collect::<Result<Vec<_>>>()?;
    exchange(
        config,
        id,
        Request::Send {
            text: text.to_string(),
            attachments,
        },
    )
    .await
}

/// Run the retry command.
///
/// # Errors
///
/// Returns an error if the conversation is missing, the retry is refused,
/// storage fails, or the reply fails.
pub async fn retry(config: &Config, id: &str) -> Result<()> {
    exchange(config, id, Request::Retry).await
}

async fn exchange(config: &Config, id: &str, request: Request) -> Result<()> {
    let store = super::open_store(config)?;
    let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
    let service = Arc::new(ChatService::new(store.clone(), transport));

    let echo = tokio::spawn(echo_reply(store.clone(), store.subscribe(), id.to_string()));
    let interrupt = {
        let service = service.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                service.cancel(&id);
            }
        })
    };

    let outcome = match request {
        Request::Send { text, attachments } => service.send(id, &text, attachments).await,
        Request::Retry => service.retry(id).await,
    };
    interrupt.abort();

    let last = store.get(id)?;
    store.close();
    let echoed = echo.await.unwrap_or_default();

    // Catch up on anything the live echo missed.
    if let (Some(conv), Some(message_id)) = (last, echoed.message_id) {
        if let Some(message) = conv.message(&message_id) {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", unseen(&message.content, echoed.printed));
            let _ = writeln!(stdout);
        }
    }

    report(id, outcome?)
}

fn report(id: &str, outcome: SendOutcome) -> Result<()> {
    match outcome {
        SendOutcome::Delivered(outcome) if outcome.is_success() => Ok(()),
        SendOutcome::Delivered(IngestOutcome::Failed(diagnostic)) => {
            Err(Error::StreamFailure(diagnostic))
        }
        SendOutcome::Delivered(IngestOutcome::Cancelled) => {
            eprintln!("Reply cancelled.");
            Ok(())
        }
        SendOutcome::Delivered(_) => {
            eprintln!("Conversation was purged; reply discarded.");
            Ok(())
        }
        SendOutcome::Rejected(Rejection::ConversationMissing) => {
            Err(Error::NotFound(format!("conversation {id}")))
        }
        SendOutcome::Rejected(rejection) => Err(Error::InvalidTransition(rejection.to_string())),
    }
}

/// Print reply text as it lands in the store. Ends when the store closes.
async fn echo_reply(
    store: Arc<ConversationStore>,
    mut events: Subscription,
    conversation_id: String,
) -> Echoed {
    let mut echoed = Echoed::default();
    while let Some(event) = events.recv().await {
        if !matches!(&event, StoreEvent::Updated { .. }) || !event.concerns(&conversation_id) {
            continue;
        }
        let Ok(Some(conv)) = store.get(&conversation_id) else {
            break;
        };
        let Some(reply) = conv.messages.last().filter(|m| m.role == Role::Assistant) else {
            continue;
        };

        if echoed.message_id.as_deref() != Some(reply.id.as_str()) {
            echoed = Echoed {
                message_id: Some(reply.id.clone()),
                printed: 0,
            };
        }
        let fresh = unseen(&reply.content, echoed.printed);
        if !fresh.is_empty() {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{fresh}");
            let _ = stdout.flush();
            echoed.printed = reply.content.len();
        }
    }
    echoed
}

/// The part of `content` past the first `printed` bytes. Replaced content
/// that no longer extends what was printed comes back whole.
fn unseen(content: &str, printed: usize) -> &str {
    content.get(printed..).unwrap_or(content)
}

/// Describe a local file as an attachment.
fn attachment_from_path(path: &Path) -> Result<Attachment> {
    let metadata = fs::metadata(path)
        .map_err(|e| Error::NotFound(format!("attachment {}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    Ok(Attachment {
        name,
        kind: kind_for(path).to_string(),
        size: metadata.len(),
        source: path.display().to_string(),
    })
}

fn kind_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => "image",
        "pdf" => "pdf",
        "txt" | "md" | "csv" | "json" | "log" => "text",
        "mp3" | "wav" | "m4a" | "ogg" => "audio",
        _ => "file",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn kind_from_extension() {
        assert_eq!(kind_for(Path::new("a/photo.JPG")), "image");
        assert_eq!(kind_for(Path::new("scan.pdf")), "pdf");
        assert_eq!(kind_for(Path::new("notes.md")), "text");
        assert_eq!(kind_for(Path::new("Makefile")), "file");
    }

    #[test]
    fn attachment_reads_size_and_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "twelve bytes").unwrap();

        let attachment = attachment_from_path(&path).unwrap();
        assert_eq!(attachment.name, "notes.txt");
        assert_eq!(attachment.kind, "text");
        assert_eq!(attachment.size, 12);
        assert_eq!(attachment.source, path.display().to_string());
    }

    #[test]
    fn missing_attachment_is_not_found() {
        let err = attachment_from_path(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn unseen_returns_new_suffix() {
        assert_eq!(unseen("Hello", 3), "lo");
        assert_eq!(unseen("Hello", 5), "");
        assert_eq!(unseen("Hi", 0), "Hi");
        // Replaced with something shorter.
        assert_eq!(unseen("Sorry", 40), "Sorry");
    }

    #[test]
    fn rejections_map_to_errors() {
        let err = report("c1", SendOutcome::Rejected(Rejection::ConversationMissing)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = report("c1", SendOutcome::Rejected(Rejection::ReplyInFlight)).unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        assert!(report("c1", SendOutcome::Delivered(IngestOutcome::Completed)).is_ok());
    }
}
