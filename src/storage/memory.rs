//! In-memory storage backend for testing.

use crate::core::Conversation;
use crate::error::Result;
use crate::storage::traits::ConversationBackend;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// In-memory storage backend for testing.
///
/// Can be switched into an unavailable mode where every write fails, to
/// exercise persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Conversation>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    /// Create a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes and deletes fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "quota exceeded").into());
        }
        Ok(())
    }
}

impl ConversationBackend for MemoryBackend {
    fn upgrade(&self) -> Result<()> {
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn put(&self, conversation: &Conversation) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Conversation>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::Utc;

    #[test]
    fn get_missing_conversation() {
        let backend = MemoryBackend::new();
        assert!(backend.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn put_and_get() {
        let backend = MemoryBackend::new();
        let conv = Conversation::new(Some("A"), Utc::now());
        backend.put(&conv).unwrap();
        assert_eq!(backend.get(&conv.id).unwrap().unwrap(), conv);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn unavailable_rejects_writes_but_allows_reads() {
        let backend = MemoryBackend::new();
        let conv = Conversation::new(None, Utc::now());
        backend.put(&conv).unwrap();

        backend.set_unavailable(true);
        let err = backend.put(&conv).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(backend.delete(&conv.id).is_err());
        assert!(backend.get(&conv.id).unwrap().is_some());

        backend.set_unavailable(false);
        backend.delete(&conv.id).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn concurrent_writes() {
        use std::sync::Arc;
        use std::thread;

        let backend = Arc::new(MemoryBackend::new());

        let mut handles = vec![];
        for _ in 0..10 {
            let backend = Arc::clone(&backend);
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    backend.put(&Conversation::new(None, Utc::now())).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(backend.load_all().unwrap().len(), 100);
    }
}
