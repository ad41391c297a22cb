//! Package manager collaborators.
//!
//! The engine talks to the host package manager through two traits:
//! [`PackageManager`] for name-based operations and [`ArchiveInstaller`]
//! for locally retrieved archives. The Debian implementations shell out to
//! `dpkg-query`, `apt-get`, `dpkg` and `dpkg-deb`, always non-interactively.

use crate::script_runner::{ensure_status, run_captured, run_inherited};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

/// Name-based package operations.
pub trait PackageManager {
    /// Names of every installed package. Queried once per run.
    fn installed(&self) -> Result<BTreeSet<String>>;

    /// Install `name`, reinstalling if it is already present.
    fn reinstall(&self, name: &str) -> Result<()>;

    /// Refresh the package index after repositories or sources changed.
    fn refresh_index(&self) -> Result<()>;
}

/// Operations on a retrieved package archive.
pub trait ArchiveInstaller {
    fn install(&self, path: &Path) -> Result<()>;

    /// Canonical package name recorded inside the archive.
    fn name_of(&self, path: &Path) -> Result<String>;
}

/// `apt-get` / `dpkg-query` backed package manager.
#[derive(Debug, Clone, Default)]
pub struct AptPackageManager;

impl AptPackageManager {
    fn apt_get() -> Command {
        let mut cmd = Command::new("apt-get");
        cmd.env("DEBIAN_FRONTEND", "noninteractive");
        cmd
    }
}

impl PackageManager for AptPackageManager {
    fn installed(&self) -> Result<BTreeSet<String>> {
        let output = run_captured(
            Command::new("dpkg-query").args(["-W", "-f", "${Package}\t${db:Status-Abbrev}\n"]),
            "dpkg-query",
        )?;
        output.ensure_success("dpkg-query")?;
        Ok(parse_dpkg_query(&output.stdout))
    }

    fn reinstall(&self, name: &str) -> Result<()> {
        tracing::info!("Installing {} via apt-get", name);
        let status = run_inherited(
            Self::apt_get().args(["install", "--reinstall", "-y", name]),
            "apt-get install",
        )?;
        ensure_status(status, &format!("apt-get install {}", name))
    }

    fn refresh_index(&self) -> Result<()> {
        tracing::info!("Refreshing package index");
        let status = run_inherited(Self::apt_get().arg("update"), "apt-get update")?;
        ensure_status(status, "apt-get update")
    }
}

/// Parse `dpkg-query -W -f '${Package}\t${db:Status-Abbrev}\n'` output.
/// Only fully installed (`ii`) packages count.
pub fn parse_dpkg_query(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .filter(|(_, status)| status.trim_end().starts_with("ii"))
        .map(|(name, _)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `dpkg` backed archive installer for `.deb` files.
#[derive(Debug, Clone, Default)]
pub struct DpkgArchiveInstaller;

impl ArchiveInstaller for DpkgArchiveInstaller {
    fn install(&self, path: &Path) -> Result<()> {
        tracing::info!("Installing archive {}", path.display());
        let status = run_inherited(
            Command::new("dpkg")
                .env("DEBIAN_FRONTEND", "noninteractive")
                .arg("-i")
                .arg(path),
            "dpkg -i",
        )?;
        ensure_status(status, &format!("dpkg -i {}", path.display()))
    }

    fn name_of(&self, path: &Path) -> Result<String> {
        let output = run_captured(
            Command::new("dpkg-deb").arg("--field").arg(path).arg("Package"),
            "dpkg-deb",
        )?;
        output.ensure_success("dpkg-deb --field")?;
        let name = output.stdout.trim();
        if name.is_empty() {
            anyhow::bail!("{} has no Package field", path.display());
        }
        Ok(name.to_string())
    }
}
