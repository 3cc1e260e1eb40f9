//! SMTP intake server library.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     SMTP INTAKE                      │
//!                 │                                                      │
//!   Client ───────┼─▶ net::Listener ─▶ security::RateLimiter ──421──▶ ✕  │
//!                 │                        │ admitted                    │
//!                 │                        ▼                             │
//!                 │                  smtp::Session (one task each)       │
//!                 │                        │ finished Message            │
//!                 │                        ▼                             │
//!                 │                  delivery::Delivery                  │
//!                 │                 direct │ queued → WorkerPool         │
//!                 │                        ▼                             │
//!                 │                storage::MessageSink ────────────────┼──▶ spool
//!                 │                                                      │
//!                 │  config · lifecycle (shutdown, signals)              │
//!                 │  observability (tracing, metrics)                    │
//!                 └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod server;
pub mod smtp;

// Persistence
pub mod delivery;
pub mod storage;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ServerConfig;
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use server::{ServerError, SmtpServer};
pub use smtp::Message;
pub use storage::{FileStore, MemoryStore, MessageSink, StorageError};
