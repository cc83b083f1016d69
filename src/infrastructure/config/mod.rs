//! SDK options.
//!
//! `TollgateOptions` is the host-facing knob set: pipeline timeouts,
//! delivery cadence, storage paths, and logging. Loaded hierarchically by
//! the [`loader`] from programmatic defaults, `tollgate.yaml`, and
//! `TOLLGATE_*` environment variables.

pub mod loader;

pub use loader::{OptionsError, OptionsLoader};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::pipeline::PipelineTimeouts;

/// Deployment environment. Controls the delivery flush cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Release,
    Dev,
}

/// Pipeline timing options, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Bound on the wait for subscription status at pipeline entry.
    pub entitlement_timeout_ms: u64,
    /// Grace window before the one config re-check.
    pub config_grace_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            entitlement_timeout_ms: 5_000,
            config_grace_ms: 1_000,
        }
    }
}

/// Analytics delivery options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Flush timer override in seconds. When unset, the environment picks
    /// the cadence: 20 s in release, 1 s in dev.
    pub flush_interval_secs: Option<u64>,
}

/// Logging options, consumed by `infrastructure::logging`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingOptions {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
    /// When set, logs also go to a rotating file in this directory.
    pub log_dir: Option<PathBuf>,
    pub enable_stdout: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            log_dir: None,
            enable_stdout: true,
        }
    }
}

/// Paths for the built-in JSON file adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageOptions {
    pub assignments_path: String,
    pub session_cache_path: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            assignments_path: ".tollgate/assignments.json".to_string(),
            session_cache_path: ".tollgate/sessions.json".to_string(),
        }
    }
}

/// Top-level SDK options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateOptions {
    pub environment: Environment,
    #[serde(default)]
    pub pipeline: PipelineOptions,
    #[serde(default)]
    pub delivery: DeliveryOptions,
    #[serde(default)]
    pub logging: LoggingOptions,
    #[serde(default)]
    pub storage: StorageOptions,
}

impl TollgateOptions {
    /// Pipeline timeouts derived from the millisecond knobs.
    pub fn pipeline_timeouts(&self) -> PipelineTimeouts {
        PipelineTimeouts {
            entitlement_wait: Duration::from_millis(self.pipeline.entitlement_timeout_ms),
            config_grace: Duration::from_millis(self.pipeline.config_grace_ms),
        }
    }

    /// Delivery flush interval: explicit override, or 20 s in release and
    /// 1 s in dev.
    pub fn flush_interval(&self) -> Duration {
        match self.delivery.flush_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => match self.environment {
                Environment::Release => Duration::from_secs(20),
                Environment::Dev => Duration::from_secs(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TollgateOptions::default();
        assert_eq!(options.environment, Environment::Release);
        assert_eq!(options.pipeline.entitlement_timeout_ms, 5_000);
        assert_eq!(options.pipeline.config_grace_ms, 1_000);
        assert_eq!(options.flush_interval(), Duration::from_secs(20));
        OptionsLoader::validate(&options).expect("default options should be valid");
    }

    #[test]
    fn test_dev_environment_flushes_fast() {
        let options = TollgateOptions {
            environment: Environment::Dev,
            ..Default::default()
        };
        assert_eq!(options.flush_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_explicit_flush_interval_wins() {
        let options = TollgateOptions {
            delivery: DeliveryOptions {
                flush_interval_secs: Some(5),
            },
            ..Default::default()
        };
        assert_eq!(options.flush_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_pipeline_timeouts_conversion() {
        let options = TollgateOptions::default();
        let timeouts = options.pipeline_timeouts();
        assert_eq!(timeouts.entitlement_wait, Duration::from_secs(5));
        assert_eq!(timeouts.config_grace, Duration::from_secs(1));
    }
}
