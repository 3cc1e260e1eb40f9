//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → sessions drain → queue drains → sink closed
//! ```
//!
//! # Design Decisions
//! - Close-once signal: every task observes it, including ones spawned late
//! - Ordered shutdown: stop accept, drain sessions, drain queue, close storage
//! - Shutdown has a deadline; the binary exits non-zero past it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
