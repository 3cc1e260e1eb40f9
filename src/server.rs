//! Server supervisor: accept loop, admission control and ordered shutdown.
//!
//! # Responsibilities
//! - Own the listening socket and the per-IP rate limiter
//! - Spawn one tracked task per admitted connection
//! - Pick the delivery strategy and run the queue workers when queued
//! - Shut down in order: stop accepting, finish sessions (bounded), drain
//!   the queue, stop the sweeper, close the sink

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{DeliveryMode, ServerConfig};
use crate::delivery::{Delivery, MailQueue, RetryPolicy, WorkerPool};
use crate::lifecycle::ShutdownSignal;
use crate::net::{Listener, ListenerError, SessionTracker};
use crate::observability::metrics;
use crate::security::{Admission, RateLimiter};
use crate::smtp::{Reply, Session, SessionError};
use crate::storage::MessageSink;

/// Error type for the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// A bound SMTP server, ready to [`run`](SmtpServer::run).
pub struct SmtpServer {
    config: Arc<ServerConfig>,
    listener: Listener,
    sink: Arc<dyn MessageSink>,
    limiter: Arc<RateLimiter>,
    tracker: SessionTracker,
}

impl SmtpServer {
    /// Bind the configured address.
    pub async fn bind(config: ServerConfig, sink: Arc<dyn MessageSink>) -> Result<Self, ServerError> {
        let listener = Listener::bind(&config.listener).await?;
        Ok(Self::with_listener(config, listener, sink))
    }

    /// Serve on an already-bound socket.
    pub fn from_listener(config: ServerConfig, listener: TcpListener, sink: Arc<dyn MessageSink>) -> Self {
        Self::with_listener(config, Listener::from_tcp(listener), sink)
    }

    fn with_listener(config: ServerConfig, listener: Listener, sink: Arc<dyn MessageSink>) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        Self {
            config: Arc::new(config),
            listener,
            sink,
            limiter,
            tracker: SessionTracker::new(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires or the listener fails, then
    /// shut down in order.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let config = Arc::clone(&self.config);
        let store_deadline = config.timeouts.store();

        let (delivery, workers) = match config.delivery.mode {
            DeliveryMode::Direct => (Delivery::direct(Arc::clone(&self.sink), store_deadline), None),
            DeliveryMode::Queued => {
                let (queue, receiver) = MailQueue::bounded(config.delivery.queue_capacity);
                let pool = WorkerPool::spawn(
                    receiver,
                    Arc::clone(&self.sink),
                    config.delivery.workers,
                    store_deadline,
                    RetryPolicy::from_config(&config.delivery),
                );
                (Delivery::queued(queue, store_deadline), Some(pool))
            }
        };

        let sweeper = tokio::spawn(Arc::clone(&self.limiter).run_cleanup(
            Duration::from_secs(config.rate_limit.cleanup_interval_secs),
            Duration::from_secs(config.rate_limit.stale_after_secs),
            shutdown.clone(),
        ));

        tracing::info!(
            address = ?self.local_addr().ok(),
            domain = %config.smtp.domain,
            delivery = delivery.mode_name(),
            "SMTP server accepting connections"
        );

        let mut sessions = JoinSet::new();
        let accepted = loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!(active = self.tracker.active_count(), "Shutdown requested; no longer accepting");
                    break Ok(());
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => log_join(joined),
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => self.admit(stream, peer, &delivery, &shutdown, &mut sessions),
                    Err(e) => {
                        tracing::error!(error = %e, critical = true, "Listener failed; no longer accepting connections");
                        break Err(ServerError::Listener(e));
                    }
                },
            }
        };

        let SmtpServer { listener, sink, tracker, .. } = self;
        drop(listener);

        // After a listener failure, existing sessions run until done or until
        // shutdown is requested.
        if accepted.is_err() {
            tokio::select! {
                _ = reap_all(&mut sessions) => {}
                _ = shutdown.recv() => {}
            }
        }

        // One budget covers every phase from here on.
        let budget = config.timeouts.shutdown();
        let deadline = Instant::now() + budget;
        let mut result = accepted;

        if tokio::time::timeout_at(deadline, reap_all(&mut sessions)).await.is_err() {
            tracing::error!(
                remaining = tracker.active_count(),
                "Sessions still running at shutdown deadline; aborting"
            );
            sessions.abort_all();
            reap_all(&mut sessions).await;
            result = Err(ServerError::ShutdownTimeout(budget));
        }

        drop(delivery);
        if let Some(workers) = workers {
            let left = deadline.saturating_duration_since(Instant::now());
            if !workers.join(left).await {
                result = Err(ServerError::ShutdownTimeout(budget));
            }
        }

        sweeper.abort();
        let _ = sweeper.await;

        if let Err(e) = sink.close().await {
            tracing::error!(error = %e, "Failed to close message storage");
        }

        tracing::info!("SMTP server stopped");
        result
    }

    fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        delivery: &Delivery,
        shutdown: &ShutdownSignal,
        sessions: &mut JoinSet<()>,
    ) {
        metrics::record_connection_accepted();

        let Some(admission) = self.limiter.try_admit(peer.ip()) else {
            metrics::record_connection_rejected();
            tracing::warn!(peer = %peer, limit = self.limiter.max_per_ip(), "Too many connections from IP; rejecting");
            sessions.spawn(reject(stream, self.config.timeouts.command()));
            return;
        };

        let guard = self.tracker.track();
        let span = tracing::info_span!("smtp_session", connection_id = %guard.id(), peer = %peer);
        let session = Session::new(
            stream,
            Arc::clone(&self.config),
            delivery.clone(),
            shutdown.clone(),
            Some(peer),
        );

        sessions.spawn(
            async move {
                let _guard = guard;
                run_session(session, admission).await;
            }
            .instrument(span),
        );
    }
}

async fn run_session(session: Session<TcpStream>, _admission: Admission) {
    tracing::info!("Session started");
    match session.run().await {
        Ok(()) => tracing::info!("Session finished"),
        Err(SessionError::ClientClosed) => tracing::info!("Client disconnected"),
        Err(SessionError::Timeout(after)) => tracing::info!(after = ?after, "Session timed out"),
        Err(e) => tracing::error!(error = %e, "Session ended with error"),
    }
}

/// Tell an over-limit client why it is being dropped, then close.
async fn reject(mut stream: TcpStream, deadline: Duration) {
    let reply = Reply::too_many_connections().to_wire();
    let _ = tokio::time::timeout(deadline, async {
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await
    })
    .await;
}

async fn reap_all(sessions: &mut JoinSet<()>) {
    while let Some(joined) = sessions.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Session task panicked");
        }
    }
}
