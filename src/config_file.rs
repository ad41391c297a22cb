//! Configuration file handling.
//!
//! An optional JSON file supplies site defaults; command-line flags
//! override it. Every key is optional:
//!
//! ```json
//! {
//!   "semaphore_dir": "/var/lib/packlist/semaphores",
//!   "sources_dir": "/etc/apt/sources.list.d",
//!   "stop_on_error": false,
//!   "skip_root_check": false
//! }
//! ```

use crate::parser::DEFAULT_SOURCES_DIR;
use crate::semaphore::DEFAULT_SEMAPHORE_DIR;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Location read when `--config` is not given. Absence is not an error.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/packlist/config.json";

/// Environment variable that disables the root check (`1` or `true`).
pub const SKIP_ROOT_CHECK_ENV: &str = "PACKLIST_SKIP_ROOT_CHECK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub semaphore_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub stop_on_error: bool,
    pub skip_root_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            semaphore_dir: PathBuf::from(DEFAULT_SEMAPHORE_DIR),
            sources_dir: PathBuf::from(DEFAULT_SOURCES_DIR),
            stop_on_error: false,
            skip_root_check: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else the default location
    /// if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(default)
                } else {
                    tracing::debug!("No configuration at {}, using defaults", default.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.semaphore_dir.is_absolute() {
            anyhow::bail!(
                "semaphore_dir must be an absolute path: {}",
                self.semaphore_dir.display()
            );
        }
        if !self.sources_dir.is_absolute() {
            anyhow::bail!(
                "sources_dir must be an absolute path: {}",
                self.sources_dir.display()
            );
        }
        Ok(())
    }

    /// Root check is skipped by the config key or by the environment.
    pub fn should_skip_root_check(&self) -> bool {
        self.skip_root_check || env_skip_root_check()
    }
}

fn env_skip_root_check() -> bool {
    std::env::var(SKIP_ROOT_CHECK_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
