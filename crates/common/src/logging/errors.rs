use opentelemetry::trace::TraceError;
use thiserror::Error;
use tracing_subscriber::{filter::ParseError, util::TryInitError};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log directive '{directive}': {source}")]
    Directive {
        directive: String,
        #[source]
        source: ParseError,
    },

    #[error("otlp pipeline: {0}")]
    Otlp(#[from] TraceError),

    #[error("global subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}
