//! Configuration of the chain-head follower.

mod config;
mod errors;

pub use config::{
    Config, FollowerConfig, LoggingConfig, DEFAULT_METHOD_GROUP, DEFAULT_NOTIFICATION_CAPACITY,
};
pub use errors::ConfigError;
