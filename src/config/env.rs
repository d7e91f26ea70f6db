//! Environment variable overrides.
//!
//! All variables are optional. Unset or unparsable values leave the file
//! configuration untouched.

use crate::config::schema::{ProxyConfig, RedirectMode};

/// Listener port, kept for compatibility with common PaaS conventions.
pub const PORT: &str = "PORT";
/// Disables the host allowlist. Loud opt-in.
pub const ALLOW_ALL_HOSTS: &str = "EMBED_PROXY_ALLOW_ALL_HOSTS";
/// Comma-separated extra allowed hostnames.
pub const ALLOWED_HOSTS: &str = "EMBED_PROXY_ALLOWED_HOSTS";
/// Requests per window per client.
pub const RATE_LIMIT_MAX: &str = "EMBED_PROXY_RATE_LIMIT_MAX";
/// Window length in seconds.
pub const RATE_LIMIT_WINDOW_SECS: &str = "EMBED_PROXY_RATE_LIMIT_WINDOW_SECS";
/// Key the rate limiter on X-Forwarded-For.
pub const TRUST_FORWARDED_FOR: &str = "EMBED_PROXY_TRUST_FORWARDED_FOR";
/// `surface` or `follow`.
pub const REDIRECT_MODE: &str = "EMBED_PROXY_REDIRECT_MODE";

/// Apply overrides looked up through `lookup` (normally `std::env::var`).
///
/// Returns one message per variable that was set but could not be used. The
/// caller logs them once logging is up.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored = Vec::new();

    if let Some(port) = parsed::<u16, F>(&lookup, PORT, &mut ignored) {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(flag) = lookup(ALLOW_ALL_HOSTS) {
        config.allowlist.allow_all = is_truthy(&flag);
    }

    if let Some(hosts) = lookup(ALLOWED_HOSTS) {
        config.allowlist.hosts.extend(
            hosts
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
        );
    }

    if let Some(max) = parsed(&lookup, RATE_LIMIT_MAX, &mut ignored) {
        config.rate_limit.max_requests = max;
    }

    if let Some(window) = parsed(&lookup, RATE_LIMIT_WINDOW_SECS, &mut ignored) {
        config.rate_limit.window_secs = window;
    }

    if let Some(flag) = lookup(TRUST_FORWARDED_FOR) {
        config.rate_limit.trust_forwarded_for = is_truthy(&flag);
    }

    if let Some(mode) = lookup(REDIRECT_MODE) {
        match mode.parse::<RedirectMode>() {
            Ok(mode) => config.upstream.redirect_mode = mode,
            Err(e) => ignored.push(format!("{}: {}", REDIRECT_MODE, e)),
        }
    }

    ignored
}

fn parsed<T, F>(lookup: &F, key: &str, ignored: &mut Vec<String>) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            ignored.push(format!("{}: cannot parse '{}'", key, raw));
            None
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
