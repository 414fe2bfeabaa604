//! Logging subsystem with OpenTelemetry support.

mod errors;
mod manager;
mod service;
mod types;


pub use errors::LoggingError;
pub use manager::{finalize, init};
pub use service::{init_logging_from_config, LoggingInitConfig};
pub use types::{FileLogging, LogFormat, LoggerConfig, OtlpExport, DEFAULT_OTLP_TIMEOUT};

/// Formats a service name with an optional label suffix.
pub fn format_service_name(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
