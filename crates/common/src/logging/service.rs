//! Common logging service initialization for binaries.

use std::{path::PathBuf, time::Duration};

use tracing::info;

use super::{
    format_service_name, init, FileLogging, LogFormat, LoggerConfig, LoggingError,
    DEFAULT_OTLP_TIMEOUT,
};

/// Configuration parameters for logging initialization.
#[derive(Debug)]
pub struct LoggingInitConfig<'a> {
    /// Base service name
    pub service_base_name: &'a str,
    /// Optional service label to append like prod or dev
    pub service_label: Option<&'a str>,
    pub service_version: Option<&'a str>,
    /// OpenTelemetry OTLP endpoint URL
    pub otlp_url: Option<&'a str>,
    pub otlp_timeout: Option<Duration>,
    /// Directory for file-based logging
    pub log_dir: Option<&'a PathBuf>,
    /// Prefix for log file names
    pub log_file_prefix: Option<&'a str>,
    /// Use JSON format instead of compact
    pub json_format: Option<bool>,
    /// Default log file prefix if not specified in config
    pub default_log_prefix: &'a str,
    /// Extra filter directives, applied after the defaults.
    pub directives: &'a [String],
}

/// Builds the [`LoggerConfig`] described by `config`.
pub(crate) fn logger_config(config: &LoggingInitConfig<'_>) -> LoggerConfig {
    let service_name = format_service_name(config.service_base_name, config.service_label);
    let format = LogFormat::from_json_flag(config.json_format.unwrap_or(false));
    let mut lconfig = LoggerConfig::new(service_name).with_stdout_format(format);

    if let Some(version) = config.service_version {
        lconfig = lconfig.with_service_version(version);
    }

    if let Some(url) = config.otlp_url {
        lconfig = lconfig.with_otlp(url, config.otlp_timeout.unwrap_or(DEFAULT_OTLP_TIMEOUT));
    }

    if let Some(dir) = config.log_dir {
        let prefix = config.log_file_prefix.unwrap_or(config.default_log_prefix);
        lconfig = lconfig.with_file_logging(FileLogging {
            directory: dir.clone(),
            file_name_prefix: prefix.to_owned(),
            format,
        });
    }

    for directive in config.directives {
        lconfig = lconfig.with_directive(directive.as_str());
    }

    lconfig
}

/// Initialize logging from configuration with all standard setup.
pub fn init_logging_from_config(config: LoggingInitConfig<'_>) -> Result<(), LoggingError> {
    let lconfig = logger_config(&config);
    let file = lconfig.file.clone();

    init(lconfig)?;

    if let Some(url) = config.otlp_url {
        info!(%url, "using OpenTelemetry tracing output");
    }
    if let Some(file) = &file {
        info!(
            log_dir = %file.directory.display(),
            log_prefix = %file.file_name_prefix,
            "file logging enabled"
        );
    }
    Ok(())
}
