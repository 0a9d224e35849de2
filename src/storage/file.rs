//! File-based storage backend.

use crate::core::Conversation;
use crate::error::{Error, Result};
use crate::storage::traits::ConversationBackend;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 1;

/// File-based storage backend with atomic writes.
///
/// Layout: `<base>/conversations/<id>.json` per conversation and
/// `<base>/schema_version`.
#[derive(Debug)]
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a new file backend rooted at `base_dir`.
    ///
    /// Nothing is touched on disk until [`ConversationBackend::upgrade`].
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn conversations_dir(&self) -> PathBuf {
        self.base_dir.join("conversations")
    }

    fn version_path(&self) -> PathBuf {
        self.base_dir.join("schema_version")
    }

    /// Get the path to a conversation file, if the id is safe to use as a
    /// file name.
    fn record_path(&self, id: &str) -> Option<PathBuf> {
        if is_safe_id(id) {
            Some(self.conversations_dir().join(format!("{id}.json")))
        } else {
            None
        }
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ConversationBackend for FileBackend {
    fn upgrade(&self) -> Result<()> {
        fs::create_dir_all(self.conversations_dir())?;

        let path = self.version_path();
        if !path.exists() {
            fs::write(&path, SCHEMA_VERSION.to_string())?;
            debug!(path = %path.display(), "created storage layout");
            return Ok(());
        }

        let found: u32 = fs::read_to_string(&path)?
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("unreadable {}", path.display())))?;
        if found > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "storage layout version {found} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let Some(path) = self.record_path(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let conversation: Conversation = serde_json::from_str(&contents)?;
        Ok(Some(conversation))
    }

    fn put(&self, conversation: &Conversation) -> Result<()> {
        let path = self
            .record_path(&conversation.id)
            .ok_or_else(|| Error::NotFound(conversation.id.clone()))?;
        let temp = path.with_extension("tmp");

        let contents = serde_json::to_string_pretty(conversation)?;
        fs::write(&temp, &contents)?;

        // Rename is atomic, so a crash mid-write leaves the old record intact.
        fs::rename(&temp, &path)?;

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let Some(path) = self.record_path(id) else {
            return Ok(());
        };
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Conversation>> {
        let dir = self.conversations_dir();
        let mut conversations = Vec::new();

        if !dir.exists() {
            return Ok(conversations);
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();

            // Only .json files; leftover .tmp files are partial writes.
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|s| serde_json::from_str::<Conversation>(&s).map_err(Error::from));
            match parsed {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        Ok(conversations)
    }
}

/// Get the default parley home directory.
///
/// Uses `PARLEY_HOME` environment variable if set, otherwise `~/.parley`.
#[must_use]
pub fn get_parley_home() -> PathBuf {
    if let Ok(home) = std::env::var("PARLEY_HOME") {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".parley")
    } else {
        PathBuf::from(".parley")
    }
}
