//! Embedding proxy library.
//!
//! Lets a browser load third-party pages inside a locally hosted portal
//! (an iframe) by fetching them through this proxy, which makes the
//! responses embeddable and keeps follow-up requests routed through it.
//!
//! # Architecture Overview
//!
//! ```text
//!   Browser (portal iframe)
//!        │  GET /api/proxy?url=https://site/page
//!        ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ http::server   request ID · trace · body limit · timeout      │
//!   │      │                                                        │
//!   │      ▼                                                        │
//!   │ security::rate_limit ──▶ http::proxy ──▶ security::allowlist  │
//!   │                              │                                │
//!   │                              ▼                                │
//!   │                     upstream::dispatcher ───────────────────┼──▶ Upstream site
//!   │                              │                                │
//!   │                              ▼                                │
//!   │                     security::headers (always)                │
//!   │                              │                                │
//!   │              ┌───────────────┴───────────────┐                │
//!   │              ▼                               ▼                │
//!   │     rewrite (HTML/CSS/JS)          stream (everything else)   │
//!   └──────────────────────────────────────────────────────────────┘
//!
//!   Cross-cutting: config · observability · lifecycle · resilience
//!   Sibling mode:  remote (headless browser sessions via WebDriver)
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod rewrite;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

// Sibling delivery mode
pub mod remote;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
