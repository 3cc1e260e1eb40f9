//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop input)
//!     → security::rate_limit (per-IP admission)
//!     → connection.rs (connection id, live session tracking)
//!     → Hand off to smtp::session
//! ```
//!
//! # Design Decisions
//! - Accept errors end the accept loop; live sessions are unaffected
//! - Each session tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, SessionGuard, SessionTracker};
pub use listener::{Listener, ListenerError};
