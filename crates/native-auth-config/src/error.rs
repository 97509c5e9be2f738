//! Errors raised while loading configuration or preparing a host.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting holds a value no authentication attempt can run with.
    #[error("Invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Domain and exchange path do not form a URL.
    #[error("Malformed exchange endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Home directory could not be determined")]
    NoHomeDir,

    #[error("Logger installation failed: {0}")]
    Logging(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
