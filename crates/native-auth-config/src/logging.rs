//! Logging initialization for host applications.
//!
//! Hosts call [`init_logging`] once at startup and use `tracing` macros
//! everywhere else. `RUST_LOG` takes precedence over the configured level.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(ConfigError::invalid(
                "log_format",
                format!("unknown format {:?}", other),
            )),
        }
    }
}

/// Settings for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Name of the host, recorded on the startup line.
    pub service_name: String,
    /// Default level filter when `RUST_LOG` is unset.
    pub default_level: tracing::Level,
    /// Format used for stderr output.
    pub format: LogFormat,
    /// Optional JSONL file that receives every log line.
    pub log_path: Option<PathBuf>,
    /// Also emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            service_name: "native-auth".into(),
            default_level: tracing::Level::INFO,
            format: LogFormat::Compact,
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(settings: &LogSettings) -> ConfigResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(settings.default_level).into())
    });

    let file_layer = match &settings.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stderr_compact = (settings.also_stderr && settings.format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let stderr_json = (settings.also_stderr && settings.format == LogFormat::Json)
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_compact)
        .with(stderr_json)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::debug!(service = %settings.service_name, "Logging initialized");
    Ok(())
}

/// Level named by a config or CLI value. Unrecognized names mean INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return tracing::Level::WARN;
    }
    level.parse().unwrap_or(tracing::Level::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_level_names() {
        let cases = [
            ("trace", Level::TRACE),
            ("Debug", Level::DEBUG),
            (" info ", Level::INFO),
            ("warning", Level::WARN),
            ("ERROR", Level::ERROR),
            ("verbose", Level::INFO),
            ("", Level::INFO),
        ];
        for (name, expected) in cases {
            assert_eq!(parse_level(name), expected, "level {:?}", name);
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("JSONL".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_format_serde_snake_case() {
        let json = serde_json::to_string(&LogFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");
    }
}
