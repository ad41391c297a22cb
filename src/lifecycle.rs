//! Lifecycle sequencer: runs one unit through its fixed steps.
//!
//! ```text
//! select → repositories → sources → refresh index → pre script
//!        → retrieve → install → post script
//! ```
//!
//! The first failing step ends the unit. Step failures are returned as a
//! [`UnitOutcome::Failed`]; only conditions that make the whole run
//! unreliable (a semaphore that cannot be written, an interrupt) are
//! returned as errors.

use crate::error::PackListError;
use crate::fetch::Retriever;
use crate::installed::InstalledSet;
use crate::package_manager::{ArchiveInstaller, PackageManager};
use crate::process_guard;
use crate::report::{Step, StepFailure, UnitOutcome, UnitReport};
use crate::repository::RepositoryRegistrar;
use crate::script_runner::ScriptRunner;
use crate::selection::{Decision, Selection, SkipReason};
use crate::semaphore::SemaphoreStore;
use crate::types::{Flag, InstallMethod, ScriptPhase};
use crate::unit::Unit;
use std::fs;

/// External collaborators used by the sequencer.
#[derive(Clone, Copy)]
pub struct Backend<'a> {
    pub packages: &'a dyn PackageManager,
    pub archives: &'a dyn ArchiveInstaller,
    pub retriever: &'a dyn Retriever,
    pub repositories: &'a dyn RepositoryRegistrar,
    pub scripts: &'a dyn ScriptRunner,
}

/// Why a unit stopped before its last step.
enum Halt {
    Skipped(SkipReason),
    Failed(StepFailure),
    Fatal(PackListError),
}

/// Per-unit mutable state for one lifecycle pass.
struct Pass<'u> {
    unit: &'u mut Unit,
    forced: bool,
    actions: Vec<String>,
}

impl Pass<'_> {
    fn record(&mut self, action: String) {
        tracing::debug!("{}: {}", self.unit.name, action);
        self.actions.push(action);
    }
}

fn failed(step: Step) -> impl FnOnce(anyhow::Error) -> Halt {
    move |err| Halt::Failed(StepFailure {
        step,
        message: format!("{:#}", err),
    })
}

/// Runs units through the lifecycle against a fixed host snapshot.
pub struct Sequencer<'a> {
    pub backend: Backend<'a>,
    pub selection: &'a Selection,
    pub installed: &'a InstalledSet,
    pub semaphores: &'a SemaphoreStore,
    pub hostname: &'a str,
    pub dry_run: bool,
}

impl<'a> Sequencer<'a> {
    /// Run the full lifecycle for `unit`.
    pub fn run(&self, unit: &mut Unit) -> crate::error::Result<UnitReport> {
        let name = unit.name.clone();
        let bucket = unit.bucket();
        let report = |outcome, actions| UnitReport {
            name: name.clone(),
            bucket,
            outcome,
            actions,
        };

        if let Err(Halt::Fatal(err)) = checkpoint() {
            return Err(err);
        }

        let forced = match self.selection.evaluate(unit, self.installed, self.hostname) {
            Decision::Skip(reason) => {
                tracing::info!("Skipping {}: {}", unit.name, reason);
                return Ok(report(UnitOutcome::Skipped { reason }, Vec::new()));
            }
            Decision::Install { forced } => forced,
        };
        if forced {
            tracing::info!("Forcing {}", unit.name);
        }

        let mut pass = Pass {
            unit,
            forced,
            actions: Vec::new(),
        };
        let outcome = match self.execute(&mut pass) {
            Ok(()) => UnitOutcome::Completed,
            Err(Halt::Skipped(reason)) => UnitOutcome::Skipped { reason },
            Err(Halt::Failed(failure)) => {
                tracing::error!("{}: {}", pass.unit.name, failure);
                UnitOutcome::Failed { failure }
            }
            Err(Halt::Fatal(err)) => return Err(err),
        };
        Ok(report(outcome, pass.actions))
    }

    fn execute(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        for step in Step::LIFECYCLE {
            checkpoint()?;
            let result = match step {
                Step::Repositories => self.register_repositories(pass),
                Step::Sources => self.write_sources(pass),
                Step::RefreshIndex => self.refresh_index(pass),
                Step::PreScript => self.run_script(pass, ScriptPhase::Pre),
                Step::Retrieve => self.retrieve(pass),
                Step::Install => self.install(pass),
                Step::PostScript => self.run_script(pass, ScriptPhase::Post),
            };
            // A command killed by the interrupt handler reports as a step
            // failure; surface the interrupt instead.
            if let Err(Halt::Failed(_)) = result {
                checkpoint()?;
            }
            result?;
        }
        Ok(())
    }

    fn register_repositories(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        let repositories = pass.unit.repositories.clone();
        for repo in repositories {
            if !self.dry_run {
                self.backend
                    .repositories
                    .add(&repo)
                    .map_err(failed(Step::Repositories))?;
            }
            pass.record(format!("add repository {}", repo));
            pass.unit.forces_source_refresh = true;
        }
        Ok(())
    }

    fn write_sources(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        let entries = pass.unit.source_entries.clone();
        for entry in entries {
            if entry.path.exists() {
                tracing::warn!(
                    "{}: source file {} already exists, leaving it untouched",
                    pass.unit.name,
                    entry.path.display()
                );
                continue;
            }
            if !self.dry_run {
                let mut content = entry.content.clone();
                if !content.ends_with('\n') {
                    content.push('\n');
                }
                if let Some(parent) = entry.path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| failed(Step::Sources)(e.into()))?;
                }
                fs::write(&entry.path, content).map_err(|e| {
                    failed(Step::Sources)(anyhow::Error::new(e).context(format!(
                        "Failed to write {}",
                        entry.path.display()
                    )))
                })?;
            }
            pass.record(format!("write source file {}", entry.path.display()));
            pass.unit.forces_source_refresh = true;
        }
        Ok(())
    }

    fn refresh_index(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        if !pass.unit.forces_source_refresh {
            return Ok(());
        }
        if !self.dry_run {
            self.backend
                .packages
                .refresh_index()
                .map_err(failed(Step::RefreshIndex))?;
        }
        pass.record("refresh package index".to_string());
        Ok(())
    }

    fn run_script(&self, pass: &mut Pass<'_>, phase: ScriptPhase) -> Result<(), Halt> {
        let Some(script) = pass.unit.script(phase).map(str::to_string) else {
            return Ok(());
        };
        let step = match phase {
            ScriptPhase::Pre => Step::PreScript,
            ScriptPhase::Post => Step::PostScript,
        };
        let once = pass.unit.is_once(phase);
        let name = pass.unit.name.clone();

        if once && self.semaphores.exists(&name, phase) {
            tracing::debug!("{}: {} script already ran once, skipping", name, phase);
            return Ok(());
        }

        if !self.dry_run {
            tracing::info!("{}: running {} script", name, phase);
            self.backend.scripts.run(&script).map_err(failed(step))?;
            if once {
                self.semaphores
                    .create(&name, phase)
                    .map_err(|e| Halt::Fatal(PackListError::environment(e)))?;
            }
        }
        pass.record(format!("run {} script", phase));
        if once {
            let marker = self.semaphores.marker_path(&name, phase);
            pass.record(format!("create semaphore {}", marker.display()));
        }
        Ok(())
    }

    fn retrieve(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        let Some(url) = pass.unit.source_url.clone() else {
            return Ok(());
        };
        if self.installed.is_installed(pass.unit.package_name()) && !pass.forced {
            tracing::debug!("{}: already installed, not downloading", pass.unit.name);
            return Ok(());
        }
        if self.dry_run {
            pass.record(format!("download {}", url));
            return Ok(());
        }

        let path = self
            .backend
            .retriever
            .fetch(&url)
            .map_err(failed(Step::Retrieve))?;
        pass.record(format!("download {}", url));

        let package = self
            .backend
            .archives
            .name_of(&path)
            .map_err(failed(Step::Retrieve))?;
        if !pass.forced && self.installed.is_installed(&package) {
            tracing::info!("{}: archive package {} is already installed", pass.unit.name, package);
            return Err(Halt::Skipped(SkipReason::ArchiveInstalled { package }));
        }
        pass.unit.resolved_archive = Some(path);
        Ok(())
    }

    fn install(&self, pass: &mut Pass<'_>) -> Result<(), Halt> {
        match pass.unit.install_method {
            InstallMethod::DownloadedArchive => {
                if let Some(path) = pass.unit.resolved_archive.clone() {
                    self.backend
                        .archives
                        .install(&path)
                        .map_err(failed(Step::Install))?;
                    pass.record(format!("install archive {}", path.display()));
                } else if self.dry_run {
                    pass.record("install downloaded archive".to_string());
                }
            }
            InstallMethod::PackageManager => {
                if pass.unit.has_flag(Flag::Virtual) {
                    tracing::debug!("{}: virtual unit, no package install", pass.unit.name);
                    return Ok(());
                }
                let package = pass.unit.package_name().to_string();
                if !self.dry_run {
                    self.backend
                        .packages
                        .reinstall(&package)
                        .map_err(failed(Step::Install))?;
                }
                pass.record(format!("install package {}", package));
            }
        }
        Ok(())
    }
}

fn checkpoint() -> Result<(), Halt> {
    if process_guard::interrupted() {
        return Err(Halt::Fatal(PackListError::Interrupted));
    }
    Ok(())
}
