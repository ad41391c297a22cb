//! Repository registration.

use crate::script_runner::{ensure_status, run_inherited};
use anyhow::Result;
use std::process::Command;

/// Registers a package repository with the host.
pub trait RepositoryRegistrar {
    fn add(&self, identifier: &str) -> Result<()>;
}

/// `add-apt-repository` backed registrar. Accepts PPAs (`ppa:user/name`)
/// and full `deb ...` lines.
#[derive(Debug, Clone, Default)]
pub struct AptRepositoryRegistrar;

impl RepositoryRegistrar for AptRepositoryRegistrar {
    fn add(&self, identifier: &str) -> Result<()> {
        tracing::info!("Adding repository {}", identifier);
        // --no-update: the sequencer refreshes the index once per unit
        let status = run_inherited(
            Command::new("add-apt-repository").args(["-y", "--no-update", identifier]),
            "add-apt-repository",
        )?;
        ensure_status(status, &format!("add-apt-repository {}", identifier))
    }
}
