//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0)
//! - Check that site shortcuts are absolute http(s) URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("portal.proxy_path '{0}' must start with '/'")]
    ProxyPath(String),

    #[error("site '{name}' has invalid url '{url}'")]
    SiteUrl { name: String, url: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("remote_browser.webdriver_url '{0}' is not a valid URL")]
    WebDriverUrl(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if !config.portal.proxy_path.starts_with('/') {
        errors.push(ValidationError::ProxyPath(config.portal.proxy_path.clone()));
    }

    for site in &config.portal.sites {
        let valid = Url::parse(&site.url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::SiteUrl {
                name: site.name.clone(),
                url: site.url.clone(),
            });
        }
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::Zero("rate_limit.max_requests"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::Zero("rate_limit.window_secs"));
    }
    if config.rate_limit.cleanup_interval_secs == 0 {
        errors.push(ValidationError::Zero("rate_limit.cleanup_interval_secs"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.connect_timeout_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if config.remote_browser.enabled {
        if Url::parse(&config.remote_browser.webdriver_url).is_err() {
            errors.push(ValidationError::WebDriverUrl(
                config.remote_browser.webdriver_url.clone(),
            ));
        }
        if config.remote_browser.session_idle_secs == 0 {
            errors.push(ValidationError::Zero("remote_browser.session_idle_secs"));
        }
        if config.remote_browser.sweep_interval_secs == 0 {
            errors.push(ValidationError::Zero("remote_browser.sweep_interval_secs"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SiteConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.portal.proxy_path = "api/proxy".into();
        config.rate_limit.window_secs = 0;
        config.portal.sites.push(SiteConfig {
            name: "ftp".into(),
            url: "ftp://files.example.com/".into(),
            icon: None,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero("rate_limit.window_secs")));
    }

    #[test]
    fn test_remote_browser_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.remote_browser.webdriver_url = "not a url".into();
        assert!(validate_config(&config).is_ok());

        config.remote_browser.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
