//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, routes)
//!     → request.rs (request ID)
//!     → proxy.rs (validate → dispatch → sanitize → rewrite | stream)
//!     → response.rs (errors → status + JSON / HTML)
//!
//! portal.rs  → /api/config, /health
//! remote.rs  → /api/session/*
//! ```

pub mod portal;
pub mod proxy;
pub mod remote;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use response::{ProxyError, TargetError};
pub use server::{AppState, HttpServer, ServerError};
