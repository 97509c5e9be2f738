//! Configuration for native social authentication hosts.

use crate::{ConfigError, ConfigResult, LogFormat, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default identity provider domain.
pub const DEFAULT_DOMAIN: &str = "https://samples.auth0.com";

/// Default token-exchange endpoint path on the provider domain.
pub const DEFAULT_EXCHANGE_PATH: &str = "/oauth/access_token";

/// Connection used when the caller does not name one.
pub const DEFAULT_CONNECTION: &str = "facebook";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default bound on how long a native login may wait for its callback.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

/// Default bound on a whole token exchange call, retry included.
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 15_000;

/// Default backoff before the exchange retry.
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 250;

/// Default cap on the exchange backoff.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

const DEFAULT_REQUIRED_PERMISSION: &str = "public_profile";

/// What to do when the user grants only part of the requested permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialGrantPolicy {
    /// Any declined permission fails the attempt with `PermissionDenied`.
    #[default]
    Reject,
    /// Continue with the reduced grant as long as every required permission
    /// was granted.
    AllowReduced,
}

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Identity provider domain, e.g. `https://tenant.auth0.com`.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Client identifier registered with the identity provider.
    #[serde(default)]
    pub client_id: String,
    /// Path of the token-exchange endpoint on `domain`.
    #[serde(default = "default_exchange_path")]
    pub exchange_path: String,
    /// Connection used when an orchestrator is built without a name.
    #[serde(default = "default_connection")]
    pub default_connection: String,
    /// Seconds to wait for the native SDK before giving up.
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    /// Milliseconds bounding a whole exchange call.
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,
    /// Backoff before the exchange retry.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// Upper bound for the exchange backoff.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Partial grant handling.
    #[serde(default)]
    pub partial_grant_policy: PartialGrantPolicy,
    /// Permissions that must be granted for an attempt to proceed.
    #[serde(default = "default_required_permissions")]
    pub required_permissions: Vec<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_exchange_path() -> String {
    DEFAULT_EXCHANGE_PATH.to_string()
}

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

fn default_callback_timeout_secs() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_SECS
}

fn default_exchange_timeout_ms() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_MS
}

fn default_retry_initial_delay_ms() -> u64 {
    DEFAULT_RETRY_INITIAL_DELAY_MS
}

fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

fn default_required_permissions() -> Vec<String> {
    vec![DEFAULT_REQUIRED_PERMISSION.to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            domain: default_domain(),
            client_id: String::new(),
            exchange_path: default_exchange_path(),
            default_connection: default_connection(),
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            exchange_timeout_ms: DEFAULT_EXCHANGE_TIMEOUT_MS,
            retry_initial_delay_ms: DEFAULT_RETRY_INITIAL_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            partial_grant_policy: PartialGrantPolicy::default(),
            required_permissions: default_required_permissions(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file when present, falling back to
    /// defaults. Environment variables are applied last.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject values that cannot drive an authentication attempt.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_connection.trim().is_empty() {
            return Err(ConfigError::invalid("default_connection", "must not be empty"));
        }
        if self.callback_timeout_secs == 0 {
            return Err(ConfigError::invalid("callback_timeout_secs", "must be positive"));
        }
        if self.exchange_timeout_ms == 0 {
            return Err(ConfigError::invalid("exchange_timeout_ms", "must be positive"));
        }
        if self.retry_initial_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::invalid(
                "retry_initial_delay_ms",
                format!("exceeds retry_max_delay_ms ({})", self.retry_max_delay_ms),
            ));
        }
        if self.required_permissions.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "required_permissions",
                "must not contain empty entries",
            ));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(log_level) = lookup("NATIVE_AUTH_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(format) = lookup("NATIVE_AUTH_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.log_format = format;
            }
        }
        if let Some(domain) = lookup("NATIVE_AUTH_DOMAIN") {
            self.domain = domain;
        }
        if let Some(client_id) = lookup("NATIVE_AUTH_CLIENT_ID") {
            self.client_id = client_id;
        }
    }

    /// Full URL of the token-exchange endpoint.
    pub fn exchange_url(&self) -> ConfigResult<Url> {
        let domain = if self.domain.contains("://") {
            self.domain.clone()
        } else {
            format!("https://{}", self.domain)
        };
        let base = Url::parse(&domain)?;
        base.join(&self.exchange_path).map_err(ConfigError::from)
    }

    /// Callback timeout as a `Duration`.
    pub fn callback_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.callback_timeout_secs)
    }

    /// Exchange call timeout as a `Duration`.
    pub fn exchange_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.exchange_timeout_ms)
    }
}
