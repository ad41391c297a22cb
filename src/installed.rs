//! Snapshot of packages installed on the host.
//!
//! Taken once before orchestration begins and passed by reference to the
//! selection engine and the lifecycle sequencer. Installs performed during
//! the run are not reflected: a later unit's "already installed" decision
//! sees the host as it was at startup.

use crate::package_manager::PackageManager;
use anyhow::{Context, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledSet {
    packages: BTreeSet<String>,
}

impl InstalledSet {
    /// Query the package manager once and freeze the result.
    pub fn snapshot(packages: &dyn PackageManager) -> Result<Self> {
        let packages = packages
            .installed()
            .context("Failed to query installed packages")?;
        tracing::info!("Installed-package snapshot: {} package(s)", packages.len());
        Ok(Self { packages })
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for InstalledSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().map(Into::into).collect(),
        }
    }
}
