//! Hand-off of completed messages from sessions to storage.
//!
//! # Data Flow
//! ```text
//! Direct:  session → store_with_deadline(sink) → reply 250 / 554
//! Queued:  session → MailQueue (bounded) → reply 250 / 554 on enqueue failure
//!                        → WorkerPool → store_with_deadline(sink), retry, log
//! ```
//!
//! # Design Decisions
//! - One strategy per server, fixed at construction; never mixed per message
//! - Direct is the default: the client learns about storage failures
//! - Queued trades that for latency; a store failure after 250 is only logged

use std::sync::Arc;
use std::time::Duration;

pub mod backoff;
pub mod queue;

pub use backoff::RetryPolicy;
pub use queue::{MailQueue, QueueError, QueueReceiver, WorkerPool};

use crate::smtp::Message;
use crate::storage::{store_with_deadline, MessageSink, StorageError};

/// Why a message could not be handed off.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// The persistence path every session of a server uses.
#[derive(Clone)]
pub enum Delivery {
    /// Store before replying.
    Direct {
        sink: Arc<dyn MessageSink>,
        deadline: Duration,
    },
    /// Enqueue and reply; workers store later.
    Queued { queue: MailQueue, deadline: Duration },
}

impl Delivery {
    pub fn direct(sink: Arc<dyn MessageSink>, deadline: Duration) -> Self {
        Delivery::Direct { sink, deadline }
    }

    pub fn queued(queue: MailQueue, deadline: Duration) -> Self {
        Delivery::Queued { queue, deadline }
    }

    /// Hand one message off. `Ok` means the client may be told 250.
    pub async fn submit(&self, message: Message) -> Result<(), DeliveryError> {
        match self {
            Delivery::Direct { sink, deadline } => {
                store_with_deadline(sink.as_ref(), &message, *deadline).await?;
                Ok(())
            }
            Delivery::Queued { queue, deadline } => {
                queue.enqueue(message, *deadline).await?;
                Ok(())
            }
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Delivery::Direct { .. } => "direct",
            Delivery::Queued { .. } => "queued",
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("mode", &self.mode_name())
            .finish()
    }
}
