//! JSON-lines spool file store.
//!
//! Each message is appended as one JSON document per line. Writes are
//! serialized by an async mutex so concurrent sessions never interleave.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{MessageSink, StorageError};
use crate::smtp::Message;

/// On-disk representation of a stored message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// The complete message as received, headers included.
    #[serde(default)]
    pub raw: String,
    pub size: usize,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl From<&Message> for StoredMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: message.sender.clone(),
            recipients: message.recipients.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            raw: String::from_utf8_lossy(&message.raw).into_owned(),
            size: message.size,
            received_at: message.received_at,
            helo: message.helo.clone(),
            peer: message.peer.map(|addr| addr.to_string()),
        }
    }
}

/// Append-only spool file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileStore {
    /// Open (or create) the spool file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(path = %path.display(), "File store opened");
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored record.
    pub async fn load(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let _guard = self.file.lock().await;
        self.read_records().await
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.load().await?.len())
    }

    /// Delete every stored message, returning how many were removed.
    pub async fn purge(&self) -> Result<usize, StorageError> {
        let mut guard = self.file.lock().await;
        let removed = self.read_records().await?.len();

        let file = guard.as_mut().ok_or(StorageError::Closed)?;
        file.flush().await?;
        file.set_len(0).await?;

        tracing::info!(path = %self.path.display(), removed, "File store purged");
        Ok(removed)
    }

    // Caller holds the file lock.
    async fn read_records(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();

        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl MessageSink for FileStore {
    async fn store(&self, message: &Message) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(&StoredMessage::from(message))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(StorageError::Closed)?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
            file.sync_all().await?;
            tracing::info!(path = %self.path.display(), "File store closed");
        }
        Ok(())
    }
}
