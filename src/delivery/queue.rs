//! Bounded mail queue and the worker pool that drains it.
//!
//! Producers (sessions) wait for queue space, so a slow sink slows intake
//! instead of growing memory. Workers exit once every sender is gone and the
//! queue is empty, which makes "drop all senders, then join" a full drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::backoff::RetryPolicy;
use crate::observability::metrics;
use crate::smtp::Message;
use crate::storage::{store_with_deadline, MessageSink};

/// Error type for enqueue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("mail queue full")]
    Full,

    #[error("mail queue closed")]
    Closed,
}

/// Sending half of the mail queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<Message>,
}

impl MailQueue {
    /// Create a queue holding at most `capacity` messages.
    pub fn bounded(capacity: usize) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, QueueReceiver { rx })
    }

    /// Enqueue a message, waiting up to `wait` for space.
    pub async fn enqueue(&self, message: Message, wait: Duration) -> Result<(), QueueError> {
        use mpsc::error::SendTimeoutError;

        match self.tx.send_timeout(message, wait).await {
            Ok(()) => {
                metrics::record_queue_depth(self.depth());
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(QueueError::Full),
            Err(SendTimeoutError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Messages waiting for a worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Receiving half, consumed by [`WorkerPool::spawn`].
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Message>,
}

/// Fixed set of tasks storing queued messages.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` tasks draining `receiver` into `sink`.
    pub fn spawn(
        receiver: QueueReceiver,
        sink: Arc<dyn MessageSink>,
        workers: usize,
        store_deadline: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let rx = Arc::new(Mutex::new(receiver.rx));
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let sink = Arc::clone(&sink);
                tokio::spawn(run_worker(worker_id, rx, sink, store_deadline, retry))
            })
            .collect();

        tracing::info!(workers, "Mail queue workers started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish draining. Workers still running after
    /// `deadline` are aborted and their queued messages dropped; returns
    /// false in that case.
    pub async fn join(self, deadline: Duration) -> bool {
        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let all = join_all(self.handles);

        match tokio::time::timeout(deadline, all).await {
            Ok(()) => true,
            Err(_) => {
                tracing::error!("Mail queue workers did not drain before deadline; aborting");
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Mail queue worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Message>>>,
    sink: Arc<dyn MessageSink>,
    store_deadline: Duration,
    retry: RetryPolicy,
) {
    loop {
        // Lock only for the dequeue so other workers can store concurrently.
        let next = {
            let mut rx = rx.lock().await;
            let next = rx.recv().await;
            metrics::record_queue_depth(rx.len());
            next
        };
        let Some(message) = next else {
            break;
        };

        store_queued(worker_id, sink.as_ref(), &message, store_deadline, retry).await;
    }

    tracing::debug!(worker_id, "Mail queue worker exiting");
}

async fn store_queued(
    worker_id: usize,
    sink: &dyn MessageSink,
    message: &Message,
    store_deadline: Duration,
    retry: RetryPolicy,
) {
    for attempt in 1..=retry.max_attempts {
        match store_with_deadline(sink, message, store_deadline).await {
            Ok(()) => {
                metrics::record_queue_store("stored");
                tracing::debug!(
                    worker_id,
                    sender = %message.sender,
                    size = message.size,
                    attempt,
                    "Mail stored from queue"
                );
                return;
            }
            Err(e) if attempt < retry.max_attempts => {
                let delay = retry.delay(attempt);
                tracing::warn!(worker_id, attempt, delay = ?delay, error = %e, "Queued store failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                metrics::record_queue_store("dropped");
                tracing::error!(
                    worker_id,
                    sender = %message.sender,
                    attempts = attempt,
                    error = %e,
                    "Failed to store mail from queue"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn message(n: usize) -> Message {
        Message::from_parts(format!("s{n}@x.com"), vec!["r@y.com".into()], b"x\r\n".to_vec())
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_workers_drain_queue_after_senders_drop() {
        let store = Arc::new(MemoryStore::new());
        let (queue, rx) = MailQueue::bounded(16);
        let pool = WorkerPool::spawn(rx, store.clone(), 3, Duration::from_secs(1), fast_retry(1));
        assert_eq!(pool.len(), 3);

        for n in 0..10 {
            queue.enqueue(message(n), Duration::from_secs(1)).await.unwrap();
        }
        drop(queue);

        assert!(pool.join(Duration::from_secs(5)).await);
        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn test_full_queue_times_out() {
        let (queue, _rx) = MailQueue::bounded(1);
        queue.enqueue(message(0), Duration::from_millis(10)).await.unwrap();
        assert_eq!(queue.depth(), 1);

        let err = queue.enqueue(message(1), Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, QueueError::Full));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (queue, rx) = MailQueue::bounded(1);
        drop(rx);
        let err = queue.enqueue(message(0), Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    struct FlakySink {
        calls: AtomicU32,
        fail_first: u32,
        inner: MemoryStore,
    }

    #[async_trait]
    impl MessageSink for FlakySink {
        async fn store(&self, message: &Message) -> Result<(), StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(StorageError::Rejected("backend unavailable".into()));
            }
            self.inner.store(message).await
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let sink = Arc::new(FlakySink {
            calls: AtomicU32::new(0),
            fail_first: 2,
            inner: MemoryStore::new(),
        });
        let (queue, rx) = MailQueue::bounded(4);
        let pool = WorkerPool::spawn(rx, sink.clone(), 1, Duration::from_secs(1), fast_retry(3));

        queue.enqueue(message(0), Duration::from_secs(1)).await.unwrap();
        drop(queue);
        assert!(pool.join(Duration::from_secs(5)).await);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = Arc::new(FlakySink {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            inner: MemoryStore::new(),
        });
        let (queue, rx) = MailQueue::bounded(4);
        let pool = WorkerPool::spawn(rx, sink.clone(), 1, Duration::from_secs(1), fast_retry(2));

        queue.enqueue(message(0), Duration::from_secs(1)).await.unwrap();
        drop(queue);
        assert!(pool.join(Duration::from_secs(5)).await);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert!(sink.inner.is_empty());
    }
}
