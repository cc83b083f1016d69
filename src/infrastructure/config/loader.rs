use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::TollgateOptions;

/// Options validation error types
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Invalid entitlement_timeout_ms: {0}. Must be positive")]
    InvalidEntitlementTimeout(u64),

    #[error("Invalid config_grace_ms: {0}. Must be positive")]
    InvalidConfigGrace(u64),

    #[error("Invalid flush_interval_secs: {0}. Must be positive")]
    InvalidFlushInterval(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Storage path cannot be empty")]
    EmptyStoragePath,
}

/// Options loader with hierarchical merging
pub struct OptionsLoader;

impl OptionsLoader {
    /// Load options with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. tollgate.yaml in the working directory
    /// 3. Environment variables (`TOLLGATE_*` prefix, highest priority)
    pub fn load() -> Result<TollgateOptions> {
        let options: TollgateOptions = Figment::new()
            .merge(Serialized::defaults(TollgateOptions::default()))
            .merge(Yaml::file("tollgate.yaml"))
            .merge(Env::prefixed("TOLLGATE_").split("__"))
            .extract()
            .context("Failed to extract options from figment")?;

        Self::validate(&options)?;
        Ok(options)
    }

    /// Load options from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<TollgateOptions> {
        let options: TollgateOptions = Figment::new()
            .merge(Serialized::defaults(TollgateOptions::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load options from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&options)?;
        Ok(options)
    }

    /// Validate options after loading
    pub fn validate(options: &TollgateOptions) -> Result<(), OptionsError> {
        if options.pipeline.entitlement_timeout_ms == 0 {
            return Err(OptionsError::InvalidEntitlementTimeout(
                options.pipeline.entitlement_timeout_ms,
            ));
        }

        if options.pipeline.config_grace_ms == 0 {
            return Err(OptionsError::InvalidConfigGrace(
                options.pipeline.config_grace_ms,
            ));
        }

        if let Some(secs) = options.delivery.flush_interval_secs {
            if secs == 0 {
                return Err(OptionsError::InvalidFlushInterval(secs));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&options.logging.level.as_str()) {
            return Err(OptionsError::InvalidLogLevel(options.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&options.logging.format.as_str()) {
            return Err(OptionsError::InvalidLogFormat(
                options.logging.format.clone(),
            ));
        }

        if options.storage.assignments_path.is_empty()
            || options.storage.session_cache_path.is_empty()
        {
            return Err(OptionsError::EmptyStoragePath);
        }

        Ok(())
    }
}
