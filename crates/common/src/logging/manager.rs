//! Logging initialization and shutdown management.

use std::sync::OnceLock;

use opentelemetry::{
    global::{self, set_text_map_propagator},
    trace::TracerProvider,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
};
use tracing::{debug, error, info, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{format::FmtSpan, layer},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use super::{
    errors::LoggingError,
    types::{LogFormat, LoggerConfig},
};

/// Global tracer provider for proper shutdown
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Builds the filter from `RUST_LOG`, defaulting to INFO, plus `directives`.
pub(crate) fn build_filter(directives: &[String]) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    for directive in directives {
        let parsed = directive
            .parse()
            .map_err(|source| LoggingError::Directive {
                directive: directive.clone(),
                source,
            })?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

/// Initializes the logging subsystem with the provided config.
///
/// Must be called from within a tokio runtime when an OTLP endpoint is set.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    set_text_map_propagator(TraceContextPropagator::new());

    let filt = build_filter(&config.directives)?;

    let stdout_sub = match config.stdout_format {
        LogFormat::Json => layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filt.clone())
            .boxed(),
        LogFormat::Compact => layer()
            .compact()
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filt.clone())
            .boxed(),
    };

    let file_layer = config.file.as_ref().map(|file| {
        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &file.directory, &file.file_name_prefix);

        if file.format == LogFormat::Json {
            layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        } else {
            layer()
                .compact()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        }
    });

    let otel_layer = match &config.otlp {
        Some(otlp) => {
            let trace_config = Config::default().with_resource(config.resource());

            // tonic is a grpc exporter with built-in retries
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&otlp.endpoint)
                .with_timeout(otlp.timeout);

            let tp = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(trace_config)
                .install_batch(Tokio)?;

            if TRACER_PROVIDER.set(tp.clone()).is_err() {
                error!("tracer provider already set");
            }

            let tracer = tp.tracer(config.service_name.clone());
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_sub)
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    info!(
        service_name = %config.service_name,
        service_version = ?config.service_version,
        "logging initialized"
    );
    Ok(())
}

/// Shuts down the logging subsystem, flushing pending spans to the OTLP
/// collector if one was configured.
pub fn finalize() {
    info!("shutting down logging");

    if let Some(provider) = TRACER_PROVIDER.get() {
        match provider.shutdown() {
            Ok(()) => info!("tracer provider shut down"),
            Err(err) => error!(%err, "failed to shut down tracer provider"),
        }
    } else {
        debug!("no tracer provider to shut down");
    }

    global::shutdown_tracer_provider();
}
