//! Configuration, paths, and logging setup shared by native auth hosts.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, PartialGrantPolicy, DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_CONNECTION, DEFAULT_DOMAIN,
    DEFAULT_EXCHANGE_PATH, DEFAULT_EXCHANGE_TIMEOUT_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_RETRY_INITIAL_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level, LogFormat, LogSettings};
pub use paths::Paths;
