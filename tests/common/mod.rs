//! Shared test doubles: one recording collaborator that stands in for the
//! package manager, archive installer, retriever, repository registrar and
//! script runner at once.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use packlist::fetch::file_name_for;
use packlist::{
    ArchiveInstaller, Backend, InstalledSet, PackageManager, RepositoryRegistrar, Retriever,
    ScriptRunner, Selection, SemaphoreStore, Sequencer,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const HOSTNAME: &str = "web01.example.org";

/// Records every collaborator call in order. Failures are injected by name.
#[derive(Default)]
pub struct Recorder {
    pub calls: RefCell<Vec<String>>,
    pub installed: BTreeSet<String>,
    /// Scripts containing any of these substrings fail
    pub failing_scripts: Vec<String>,
    /// Packages whose install fails
    pub failing_packages: BTreeSet<String>,
    /// URL -> package name recorded inside the retrieved archive
    pub archive_names: BTreeMap<String, String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(names: &[&str]) -> Self {
        Self {
            installed: names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn backend(&self) -> Backend<'_> {
        Backend {
            packages: self,
            archives: self,
            retriever: self,
            repositories: self,
            scripts: self,
        }
    }

    pub fn snapshot(&self) -> InstalledSet {
        InstalledSet::snapshot(self).unwrap()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl PackageManager for Recorder {
    fn installed(&self) -> Result<BTreeSet<String>> {
        Ok(self.installed.clone())
    }

    fn reinstall(&self, name: &str) -> Result<()> {
        self.log(format!("reinstall {}", name));
        if self.failing_packages.contains(name) {
            return Err(anyhow!("apt-get install {} exited with status 100", name));
        }
        Ok(())
    }

    fn refresh_index(&self) -> Result<()> {
        self.log("refresh".to_string());
        Ok(())
    }
}

impl ArchiveInstaller for Recorder {
    fn install(&self, path: &Path) -> Result<()> {
        self.log(format!("dpkg -i {}", path.display()));
        Ok(())
    }

    fn name_of(&self, path: &Path) -> Result<String> {
        let file = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
        Ok(self
            .archive_names
            .iter()
            .find(|(url, _)| file_name_for(url) == file)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| file.trim_end_matches(".deb").to_string()))
    }
}

impl Retriever for Recorder {
    fn fetch(&self, url: &str) -> Result<PathBuf> {
        self.log(format!("fetch {}", url));
        Ok(PathBuf::from("/tmp/packlist-work").join(file_name_for(url)))
    }
}

impl RepositoryRegistrar for Recorder {
    fn add(&self, repository: &str) -> Result<()> {
        self.log(format!("add-repo {}", repository));
        Ok(())
    }
}

impl ScriptRunner for Recorder {
    fn run(&self, command: &str) -> Result<()> {
        self.log(format!("script {}", command));
        if self.failing_scripts.iter().any(|s| command.contains(s.as_str())) {
            return Err(anyhow!("script exited with status 1"));
        }
        Ok(())
    }
}

/// A sequencer over `recorder` with the fixed test hostname.
pub fn sequencer<'a>(
    recorder: &'a Recorder,
    selection: &'a Selection,
    installed: &'a InstalledSet,
    semaphores: &'a SemaphoreStore,
    dry_run: bool,
) -> Sequencer<'a> {
    Sequencer {
        backend: recorder.backend(),
        selection,
        installed,
        semaphores,
        hostname: HOSTNAME,
        dry_run,
    }
}
