//! Message persistence.
//!
//! # Data Flow
//! ```text
//! smtp::session (finalized Message)
//!     → delivery (direct call or queue + workers)
//!     → MessageSink::store (deadline applied by the caller)
//! ```
//!
//! # Design Decisions
//! - The core only knows "store one message, maybe fail"
//! - Sinks must tolerate concurrent calls from many sessions and workers
//! - `close` runs once, after every producer has stopped

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::smtp::Message;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage is closed")]
    Closed,

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Destination for completed messages.
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// Persist one message.
    async fn store(&self, message: &Message) -> Result<(), StorageError>;

    /// Release backend resources.
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Call `sink.store` with a deadline.
pub async fn store_with_deadline(
    sink: &dyn MessageSink,
    message: &Message,
    deadline: Duration,
) -> Result<(), StorageError> {
    match tokio::time::timeout(deadline, sink.store(message)).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(deadline)),
    }
}

/// Build the sink selected by configuration.
pub async fn open_sink(config: &StorageConfig) -> Result<Arc<dyn MessageSink>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; messages are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::File => Ok(Arc::new(FileStore::open(&config.path).await?)),
    }
}
