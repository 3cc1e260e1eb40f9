//! In-memory message store for tests and development.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MessageSink, StorageError};
use crate::smtp::Message;

/// Keeps every stored message in a vector.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("memory store mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("memory store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stored message, returning how many were removed.
    pub fn purge(&self) -> usize {
        let mut messages = self.messages.lock().expect("memory store mutex poisoned");
        let removed = messages.len();
        messages.clear();
        removed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for MemoryStore {
    async fn store(&self, message: &Message) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        self.messages
            .lock()
            .expect("memory store mutex poisoned")
            .push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
