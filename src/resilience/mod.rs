//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → upstream dispatcher (connect timeout + response deadline)
//!     → timeouts.rs (idle deadline on every streamed chunk)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No automatic retries: retry policy belongs to the browser
//! - Timeout errors are distinct from other errors (504, not 502)

pub mod timeouts;
