use std::io;

use strata_chainhead_rpc::TransportError;
use strata_chainhead_tracker::ChainHeadError;
use strata_common::logging::LoggingError;
use strata_config::ConfigError;
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("invalid args: {0}")]
    InvalidArgs(String),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("connect: {0}")]
    Connect(#[from] TransportError),

    #[error("tracker: {0}")]
    Tracker(#[from] ChainHeadError),
}
