//! On-disk locations of a native auth host.
//!
//! ```text
//! ~/.native-auth/
//! ├── config.json
//! └── logs/
//!     └── auth.jsonl
//! ```

use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

const HOME_DIR_NAME: &str = ".native-auth";
const CONFIG_FILE_NAME: &str = "config.json";
const LOGS_DIR_NAME: &str = "logs";
const LOG_FILE_NAME: &str = "auth.jsonl";

#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Paths under `~/.native-auth`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::with_base_dir(home.join(HOME_DIR_NAME)))
    }

    /// Paths under an explicit root (tests, `--config-dir`).
    pub fn with_base_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR_NAME)
    }

    /// JSONL sink used when file logging is enabled.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Create the root and `logs/` if missing.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
