//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, defaults on failure)
//!     → env.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via AppState to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_effective_config, ConfigError, EffectiveConfig};
pub use schema::{
    AllowlistConfig, ListenerConfig, LogFormat, ObservabilityConfig, PortalConfig, ProxyConfig,
    RateLimitConfig, RedirectMode, RemoteBrowserConfig, SecurityConfig, SiteConfig,
    UpstreamConfig,
};
