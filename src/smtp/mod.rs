//! SMTP protocol engine.
//!
//! # Data Flow
//! ```text
//! client bytes → Session::read_line → Command::parse → handler
//!     → Transaction (envelope + content) → Message::from_parts
//!     → Delivery::submit → Reply::to_wire → client
//! ```
//!
//! # Design Decisions
//! - One task per connection; a session shares nothing mutable with others
//! - Replies are values ([`Reply`]) rendered in one place
//! - The engine is generic over the stream so tests drive it in memory

pub mod command;
pub mod message;
pub mod response;
pub mod session;
pub mod state;

pub use command::Command;
pub use message::Message;
pub use response::Reply;
pub use session::{Session, SessionError};
pub use state::{SessionState, Transaction};
