//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection:
//!     → rate_limit.rs (check per-IP concurrency)
//!     → admitted: session spawned holding an Admission guard
//!     → rejected: 421 written, connection closed
//! ```
//!
//! # Design Decisions
//! - Admission happens before any protocol processing
//! - Fail closed: an IP at its limit is turned away immediately
//! - Slots are returned by guard drop, never by hand

pub mod rate_limit;

pub use rate_limit::{Admission, RateLimiter};
