use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default value for `with_runtime` in [`FollowerConfig`].
const DEFAULT_WITH_RUNTIME: bool = true;

/// Default value for `method_group` in [`FollowerConfig`].
///
/// Mirrors `strata_chainhead_tracker::DEFAULT_METHOD_GROUP`; the follower
/// binary checks the two agree.
pub const DEFAULT_METHOD_GROUP: &str = "chainHead";

/// Default value for `notification_capacity` in [`FollowerConfig`].
///
/// Mirrors `strata_chainhead_tracker::DEFAULT_NOTIFICATION_CAPACITY`.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Websocket endpoint of the node, `ws://` or `wss://`.
    pub rpc_url: String,

    /// Ask the node to report runtime changes.
    #[serde(default = "default_with_runtime")]
    pub with_runtime: bool,

    /// Prefix of the method group to follow through.
    #[serde(default = "default_method_group")]
    pub method_group: String,

    /// Version segment to use instead of asking the node, e.g. "v1".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,

    /// Versions we accept when detecting. Any version if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<String>>,

    /// Chain notifications buffered per subscriber.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_with_runtime() -> bool {
    DEFAULT_WITH_RUNTIME
}

fn default_method_group() -> String {
    DEFAULT_METHOD_GROUP.to_owned()
}

fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

impl FollowerConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            with_runtime: DEFAULT_WITH_RUNTIME,
            method_group: default_method_group(),
            fixed_version: None,
            supported_versions: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc_url.starts_with("ws://") || self.rpc_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "rpc_url must be a websocket url, got {}",
                self.rpc_url
            )));
        }
        if self.method_group.is_empty() {
            return Err(ConfigError::Invalid("method_group is empty".to_owned()));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be positive".to_owned(),
            ));
        }
        if let Some(supported) = &self.supported_versions {
            if supported.is_empty() {
                return Err(ConfigError::Invalid(
                    "supported_versions is empty".to_owned(),
                ));
            }
            if let Some(fixed) = &self.fixed_version {
                if !supported.contains(fixed) {
                    return Err(ConfigError::Invalid(format!(
                        "fixed_version {fixed} is not in supported_versions"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Service label to append to the service name (e.g., "prod", "dev").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_label: Option<String>,

    /// OpenTelemetry OTLP endpoint URL for distributed tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_url: Option<String>,

    /// Seconds the OTLP exporter waits on the collector per batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_timeout_secs: Option<u64>,

    /// Directory path for file-based logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_prefix: Option<String>,

    /// Use JSON format for logs instead of compact format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,

    /// Extra filter directives, e.g. "strata_chainhead_tracker=debug".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub follower: FollowerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new(follower: FollowerConfig) -> Self {
        Self {
            follower,
            logging: LoggingConfig::default(),
        }
    }

    /// Parses and validates a TOML config.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.follower.validate()?;
        if self.logging.otlp_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "otlp_timeout_secs must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
