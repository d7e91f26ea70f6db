//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the embedding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Portal settings: site shortcuts, static files, proxy path.
    pub portal: PortalConfig,

    /// Hosts the proxy may fetch on a client's behalf.
    pub allowlist: AllowlistConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Outbound request settings.
    pub upstream: UpstreamConfig,

    /// Inbound request hardening.
    pub security: SecurityConfig,

    /// Screenshot-streaming remote browser mode.
    pub remote_browser: RemoteBrowserConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Portal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Site shortcuts shown in the portal grid. Their hosts are allowlisted.
    pub sites: Vec<SiteConfig>,

    /// Directory holding the portal's static files (index.html, script.js).
    pub static_dir: Option<String>,

    /// Path of the proxy endpoint; rewritten URLs point here.
    pub proxy_path: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            static_dir: None,
            proxy_path: "/api/proxy".to_string(),
        }
    }
}

/// A site shortcut.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SiteConfig {
    /// Display name.
    pub name: String,

    /// Absolute URL opened through the proxy.
    pub url: String,

    /// Optional icon (usually an emoji).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Allowlist configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AllowlistConfig {
    /// Extra hostnames allowed besides the site shortcuts.
    pub hosts: Vec<String>,

    /// Disable the allowlist entirely. Never enable on a public listener.
    pub allow_all: bool,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting on the proxy endpoint.
    pub enabled: bool,

    /// Maximum requests per client within one window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How often expired windows are purged, in seconds.
    pub cleanup_interval_secs: u64,

    /// Key clients on the left-most X-Forwarded-For entry instead of the
    /// peer address. Only enable behind a trusted load balancer.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 60,
            cleanup_interval_secs: 60,
            trust_forwarded_for: false,
        }
    }
}

/// How upstream 3xx responses are handled.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// Hand the 3xx and its rewritten Location back to the client.
    #[default]
    Surface,
    /// Follow redirects inside the transport.
    Follow,
}

impl std::str::FromStr for RedirectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "surface" => Ok(Self::Surface),
            "follow" => Ok(Self::Follow),
            other => Err(format!("unknown redirect mode '{}'", other)),
        }
    }
}

/// Outbound request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Time allowed for the upstream to answer (and for each streamed chunk).
    pub timeout_secs: u64,

    /// TCP/TLS connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Redirect handling.
    pub redirect_mode: RedirectMode,

    /// Redirect hop limit in follow mode.
    pub max_redirects: usize,

    /// User-Agent sent when the client did not provide one.
    pub user_agent: String,

    /// Accept sent when the client did not provide one.
    pub accept: String,

    /// Accept-Language sent when the client did not provide one.
    pub accept_language: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            redirect_mode: RedirectMode::Surface,
            max_redirects: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
                image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Remote browser (screenshot streaming) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteBrowserConfig {
    /// Enable the /api/session endpoints.
    pub enabled: bool,

    /// Base URL of a W3C WebDriver endpoint (chromedriver, selenium).
    pub webdriver_url: String,

    /// Sessions idle longer than this are closed.
    pub session_idle_secs: u64,

    /// Interval of the idle-session sweep.
    pub sweep_interval_secs: u64,

    /// Browser viewport width.
    pub viewport_width: u32,

    /// Browser viewport height.
    pub viewport_height: u32,
}

impl Default for RemoteBrowserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            session_idle_secs: 30 * 60,
            sweep_interval_secs: 60,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
