//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming proxy request:
//!     → rate_limit.rs (fixed window per client identity)
//!     → allowlist.rs (exact host match, fail closed)
//!
//! Upstream hop:
//!     → headers.rs (drop hop-by-hop and proxy-owned request headers)
//!
//! Upstream response:
//!     → headers.rs (framing headers, CSP, cookies, Location, CORS)
//! ```
//!
//! # Design Decisions
//! - Fail closed: unparseable or unknown hosts are rejected
//! - Bypassing the allowlist is an explicit, logged opt-in
//! - Rate limiting covers the proxy endpoint only, not static assets

pub mod allowlist;
pub mod headers;
pub mod rate_limit;
