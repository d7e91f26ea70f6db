//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::env::apply_env_overrides;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// The configuration the server runs with, plus what went wrong getting it.
///
/// Loading happens before logging is initialized, so problems are carried
/// here for the caller to report.
#[derive(Debug)]
pub struct EffectiveConfig {
    pub config: ProxyConfig,
    /// Why the file was not used, when it was not.
    pub fallback: Option<ConfigError>,
    /// Environment overrides that were set but ignored.
    pub ignored_env: Vec<String>,
}

impl EffectiveConfig {
    /// Emit the deferred warnings. Call after logging is initialized.
    pub fn log_warnings(&self, path: &Path) {
        if let Some(e) = &self.fallback {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Configuration missing or invalid, falling back to defaults"
            );
        }
        for message in &self.ignored_env {
            tracing::warn!(override_error = %message, "Ignoring environment override");
        }
    }
}

/// Load the configuration the server runs with.
///
/// A missing or broken file degrades to defaults (no sites, empty allowlist)
/// instead of aborting. Environment overrides are applied last and the result
/// is validated again.
pub fn load_effective_config(path: &Path) -> Result<EffectiveConfig, ConfigError> {
    let (mut config, fallback) = match load_config(path) {
        Ok(config) => (config, None),
        Err(e) => (ProxyConfig::default(), Some(e)),
    };

    let ignored_env = apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(EffectiveConfig {
        config,
        fallback,
        ignored_env,
    })
}
