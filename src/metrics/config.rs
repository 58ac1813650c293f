use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{get_env_bool, get_env_list, get_env_with_prefix};

/// Metrics configuration for instrumented applications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Path for the metrics endpoint (default: /metrics)
    #[serde(default = "default_path")]
    pub path: String,

    /// Prefix prepended to every metric name (default: axum)
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Paths that bypass recording. A trailing `*` makes the entry a prefix match.
    #[serde(default = "default_skip_paths")]
    pub skip_paths: Vec<String>,

    /// Emit one structured log event per instrumented request
    #[serde(default)]
    pub log_requests: bool,

    /// Optional file the registry snapshot is periodically written to
    #[serde(default)]
    pub export_file: Option<PathBuf>,

    #[serde(default = "default_export_interval_seconds")]
    pub export_interval_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
            prefix: default_prefix(),
            skip_paths: default_skip_paths(),
            log_requests: false,
            export_file: None,
            export_interval_seconds: default_export_interval_seconds(),
        }
    }
}

impl MetricsConfig {
    /// Create a new MetricsConfig builder
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::new()
    }

    /// Load metrics configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.enabled = get_env_bool("METRICS_ENABLED", config.enabled);
        config.log_requests = get_env_bool("METRICS_LOG_REQUESTS", config.log_requests);

        if let Some(path) = get_env_with_prefix("METRICS_PATH") {
            config.path = path;
        }

        if let Some(prefix) = get_env_with_prefix("METRICS_PREFIX") {
            config.prefix = prefix;
        }

        if let Some(skip_paths) = get_env_list("METRICS_SKIP_PATHS") {
            config.skip_paths = skip_paths;
        }

        if let Some(file) = get_env_with_prefix("METRICS_EXPORT_FILE") {
            config.export_file = Some(PathBuf::from(file));
        }

        if let Some(interval) = get_env_with_prefix("METRICS_EXPORT_INTERVAL_SECONDS") {
            if let Ok(secs) = interval.parse() {
                config.export_interval_seconds = secs;
            }
        }

        config
    }

    /// Interval between two file snapshots, never shorter than one second
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_seconds.max(1))
    }
}

/// Builder for MetricsConfig
#[must_use = "builder does nothing until you call build()"]
pub struct MetricsConfigBuilder {
    config: MetricsConfig,
}

impl MetricsConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MetricsConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Replace the skip-list entirely
    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.config.skip_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Append one entry to the skip-list
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.config.skip_paths.push(path.into());
        self
    }

    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.config.log_requests = enabled;
        self
    }

    pub fn export_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.export_file = Some(path.into());
        self
    }

    pub fn export_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.export_interval_seconds = seconds;
        self
    }

    pub fn build(self) -> MetricsConfig {
        self.config
    }
}

impl Default for MetricsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "axum".to_string()
}

fn default_skip_paths() -> Vec<String> {
    vec![
        "/metrics".to_string(),
        "/_readyz".to_string(),
        "/_healthz".to_string(),
    ]
}

fn default_export_interval_seconds() -> u64 {
    10
}
