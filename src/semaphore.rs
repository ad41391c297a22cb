//! Run-once semaphore markers.
//!
//! One empty file per `(unit, phase)` under a fixed directory, named
//! `<unit>.<once-flag>` (for example `docker-ce.post_once`). Presence is the
//! only state. Access is check-then-create without locking, which is only
//! correct while a single invocation runs at a time.

use crate::types::ScriptPhase;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

/// Default marker directory.
pub const DEFAULT_SEMAPHORE_DIR: &str = "/var/lib/packlist/semaphores";

#[derive(Debug, Clone)]
pub struct SemaphoreStore {
    root: PathBuf,
}

impl SemaphoreStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Marker path for `(unit, phase)`.
    pub fn marker_path(&self, unit: &str, phase: ScriptPhase) -> PathBuf {
        self.root.join(format!("{}.{}", unit, phase.once_flag()))
    }

    pub fn exists(&self, unit: &str, phase: ScriptPhase) -> bool {
        self.marker_path(unit, phase).exists()
    }

    /// Record that `(unit, phase)` has run, creating the directory if needed.
    pub fn create(&self, unit: &str, phase: ScriptPhase) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create semaphore directory {}", self.root.display())
        })?;

        let path = self.marker_path(unit, phase);
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to create semaphore {}", path.display()))?;

        tracing::debug!("Created semaphore {}", path.display());
        Ok(path)
    }
}

impl Default for SemaphoreStore {
    fn default() -> Self {
        Self::new(DEFAULT_SEMAPHORE_DIR)
    }
}
