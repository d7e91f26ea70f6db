//! Response body rewriting.
//!
//! # Data Flow
//! ```text
//! upstream URL + proxy path → context.rs (RewriteContext)
//! buffered textual body     → content.rs (regex passes) → rewritten text
//! ```
//!
//! # Design Decisions
//! - Only HTML, CSS and JavaScript bodies are touched; everything else streams
//! - Heuristic text transform, no parser; a tokenizer could replace
//!   content.rs behind the same RewriteContext interface
//! - Best effort: a body that cannot be rewritten is forwarded unchanged

pub mod content;
pub mod context;

pub use content::{is_rewritable, rewrite_body, rewrite_text, RewriteError};
pub use context::RewriteContext;
