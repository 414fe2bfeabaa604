//! Settings consumed by [`init`](super::init).

use std::{path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Directives applied on top of `RUST_LOG` unless overridden.
///
/// The websocket client logs every frame at debug.
const DEFAULT_DIRECTIVES: &[&str] = &["jsonrpsee=info", "soketto=warn"];

/// How long the OTLP exporter waits on the collector per batch.
pub const DEFAULT_OTLP_TIMEOUT: Duration = Duration::from_secs(10);

/// Line encoding of a log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Daily-rotated log files, named `<prefix>.<date>` under `directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogging {
    pub directory: PathBuf,
    pub file_name_prefix: String,
    pub format: LogFormat,
}

/// Span export to an OpenTelemetry collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpExport {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    pub stdout_format: LogFormat,
    pub file: Option<FileLogging>,
    pub otlp: Option<OtlpExport>,
    /// Filter directives added after `RUST_LOG` is read.
    pub directives: Vec<String>,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            stdout_format: LogFormat::Compact,
            file: None,
            otlp: None,
            directives: DEFAULT_DIRECTIVES.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    pub fn with_stdout_format(mut self, format: LogFormat) -> Self {
        self.stdout_format = format;
        self
    }

    pub fn with_file_logging(mut self, file: FileLogging) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_otlp(mut self, endpoint: impl Into<String>, timeout: Duration) -> Self {
        self.otlp = Some(OtlpExport {
            endpoint: endpoint.into(),
            timeout,
        });
        self
    }

    /// Adds a filter directive such as `strata_chainhead_tracker=debug`.
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// OpenTelemetry resource naming this service.
    pub fn resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.name", self.service_name.clone())];
        if let Some(version) = &self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }
        Resource::new(attributes)
    }
}
