//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! validated target + client request
//!     → dispatcher.rs (defaults, deadline, redirect policy)
//!     → UpstreamResponse (head available, body unread)
//!     → buffered() for rewriting | into_stream() for passthrough
//!
//! failures → error.rs (ConnectionRefused / Timeout / HostNotFound / Protocol)
//! ```

pub mod dispatcher;
pub mod error;

pub use dispatcher::{Dispatcher, UpstreamRequest, UpstreamResponse};
pub use error::UpstreamError;
