//! The `Unit` record: one declared installable entity.

use crate::types::{Bucket, Flag, InstallMethod, ScriptPhase};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A package-source file to materialize before installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    /// Absolute target path (basename joined under the sources directory)
    pub path: PathBuf,
    /// File content, written verbatim
    pub content: String,
}

/// One unit declared by the package-list document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub name: String,
    pub install_method: InstallMethod,
    pub source_url: Option<String>,
    /// Repository identifiers, in declaration order, without duplicates
    pub repositories: Vec<String>,
    pub source_entries: Vec<SourceEntry>,
    pub scripts: BTreeMap<ScriptPhase, String>,
    pub flags: BTreeSet<Flag>,
    pub host_patterns: BTreeSet<String>,
    pub package_name: Option<String>,

    /// Local path of the retrieved archive (set during execution)
    #[serde(skip)]
    pub resolved_archive: Option<PathBuf>,
    /// Set once a repository or source file was newly added during execution
    #[serde(skip)]
    pub forces_source_refresh: bool,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name used when talking to the package manager.
    pub fn package_name(&self) -> &str {
        self.package_name.as_deref().unwrap_or(&self.name)
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::for_flags(&self.flags)
    }

    pub fn script(&self, phase: ScriptPhase) -> Option<&str> {
        self.scripts.get(&phase).map(String::as_str)
    }

    /// Whether the script for `phase` must run at most once per host.
    pub fn is_once(&self, phase: ScriptPhase) -> bool {
        self.has_flag(phase.once_flag()) || self.has_flag(Flag::BothScriptsOnce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_defaults_to_unit_name() {
        let mut unit = Unit::new("emacs");
        assert_eq!(unit.package_name(), "emacs");

        unit.package_name = Some("emacs-nox".to_string());
        assert_eq!(unit.package_name(), "emacs-nox");
    }

    #[test]
    fn test_once_flags() {
        let mut unit = Unit::new("dotfiles");
        assert!(!unit.is_once(ScriptPhase::Pre));

        unit.flags.insert(Flag::PostScriptOnce);
        assert!(!unit.is_once(ScriptPhase::Pre));
        assert!(unit.is_once(ScriptPhase::Post));

        unit.flags.insert(Flag::BothScriptsOnce);
        assert!(unit.is_once(ScriptPhase::Pre));
    }
}
