//! Skip/selection engine.
//!
//! A pure function of a unit, the global selection filters, the installed
//! snapshot and the current hostname. Rules are evaluated in a fixed
//! precedence; the first that applies decides.

use crate::installed::InstalledSet;
use crate::types::Flag;
use crate::unit::Unit;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Global filters set from the command line.
///
/// An empty `only_*` set is inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub force_all: bool,
    pub skip_names: BTreeSet<String>,
    pub skip_flags: BTreeSet<Flag>,
    pub only_names: BTreeSet<String>,
    pub only_flags: BTreeSet<Flag>,
}

/// Why a unit is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    AlreadyInstalled,
    /// The retrieved archive's real package name is installed
    ArchiveInstalled { package: String },
    FlaggedSkip,
    SkippedByName,
    SkippedByFlag { flag: Flag },
    NotInOnlyNames,
    NotInOnlyFlags,
    Hostname,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::ArchiveInstalled { package } => write!(f, "already installed as {package}"),
            Self::FlaggedSkip => write!(f, "flagged skip"),
            Self::SkippedByName => write!(f, "skipped by name"),
            Self::SkippedByFlag { flag } => write!(f, "skipped by flag `{flag}`"),
            Self::NotInOnlyNames => write!(f, "not selected by name"),
            Self::NotInOnlyFlags => write!(f, "not selected by flag"),
            Self::Hostname => write!(f, "hostname"),
        }
    }
}

/// Outcome of [`Selection::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Decision {
    /// Install. `forced` is set when a force rule decided it.
    Install { forced: bool },
    Skip(SkipReason),
}

impl Decision {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Install { forced: true })
    }

    /// Human-readable reason, as printed in unit status lines.
    pub fn reason(&self) -> String {
        match self {
            Self::Install { forced: true } => "forcing".to_string(),
            Self::Install { forced: false } => "selected".to_string(),
            Self::Skip(reason) => reason.to_string(),
        }
    }
}

impl Selection {
    /// Decide whether `unit` is installed on `hostname`.
    pub fn evaluate(&self, unit: &Unit, installed: &InstalledSet, hostname: &str) -> Decision {
        if self.force_all || unit.has_flag(Flag::Force) {
            return Decision::Install { forced: true };
        }
        if installed.is_installed(unit.package_name()) {
            return Decision::Skip(SkipReason::AlreadyInstalled);
        }
        if unit.has_flag(Flag::Skip) {
            return Decision::Skip(SkipReason::FlaggedSkip);
        }
        if self.skip_names.contains(&unit.name) {
            return Decision::Skip(SkipReason::SkippedByName);
        }
        if let Some(flag) = unit.flags.intersection(&self.skip_flags).next() {
            return Decision::Skip(SkipReason::SkippedByFlag { flag: *flag });
        }
        if !self.only_names.is_empty() && !self.only_names.contains(&unit.name) {
            return Decision::Skip(SkipReason::NotInOnlyNames);
        }
        if !self.only_flags.is_empty() && self.only_flags.is_disjoint(&unit.flags) {
            return Decision::Skip(SkipReason::NotInOnlyFlags);
        }
        if !host_matches(&unit.host_patterns, hostname) {
            return Decision::Skip(SkipReason::Hostname);
        }
        Decision::Install { forced: false }
    }
}

/// Match one pattern against a hostname.
///
/// `*.suffix` matches any hostname ending in `suffix`; any other pattern
/// matches as a substring, which also covers `pattern.<domain>`.
pub fn pattern_matches(pattern: &str, hostname: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.")
        && hostname.ends_with(suffix)
    {
        return true;
    }
    hostname.contains(pattern)
}

/// Evaluate a unit's host patterns against `hostname`.
///
/// Any matching `!` exclusion rejects. Otherwise an exclude-only (or empty)
/// set accepts, and a set with inclusions accepts iff one of them matches.
pub fn host_matches<'a>(patterns: impl IntoIterator<Item = &'a String>, hostname: &str) -> bool {
    let hostname = hostname.to_lowercase();
    let mut inclusions = Vec::new();

    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(excluded) => {
                if pattern_matches(excluded, &hostname) {
                    return false;
                }
            }
            None => inclusions.push(pattern.as_str()),
        }
    }

    inclusions.is_empty() || inclusions.iter().any(|p| pattern_matches(p, &hostname))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_suffix_pattern() {
        assert!(pattern_matches("*.foo.com", "a.b.foo.com"));
        assert!(!pattern_matches("*.foo.com", "foo.com.evil.com"));
    }

    #[test]
    fn test_prefix_with_dot_pattern() {
        assert!(pattern_matches("build01", "build01.lab.example"));
        assert!(pattern_matches("build01", "build01"));
        assert!(!pattern_matches("build02", "build01.lab.example"));
    }

    #[test]
    fn test_exclusion_wins_without_inclusions() {
        assert!(!host_matches(&patterns(&["!*.foo.com"]), "x.foo.com"));
        assert!(host_matches(&patterns(&["!*.foo.com"]), "x.bar.com"));
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let set = patterns(&["*.foo.com", "!db.foo.com"]);
        assert!(host_matches(&set, "web.foo.com"));
        assert!(!host_matches(&set, "db.foo.com"));
    }

    #[test]
    fn test_empty_patterns_match_everywhere() {
        assert!(host_matches(&patterns(&[]), "anything"));
    }

    #[test]
    fn test_hostname_is_case_folded() {
        assert!(host_matches(&patterns(&["laptop"]), "LAPTOP.local"));
    }

    const HOST: &str = "web01.example.org";

    fn unit(name: &str, flags: &[Flag]) -> Unit {
        let mut unit = Unit::new(name);
        unit.flags = flags.iter().copied().collect();
        unit
    }

    fn nothing_installed() -> InstalledSet {
        InstalledSet::from_iter(Vec::<String>::new())
    }

    #[test]
    fn test_skip_by_name() {
        let selection = Selection {
            skip_names: ["emacs".to_string()].into(),
            ..Selection::default()
        };
        assert_eq!(
            selection.evaluate(&unit("emacs", &[]), &nothing_installed(), HOST),
            Decision::Skip(SkipReason::SkippedByName)
        );
        assert_eq!(
            selection.evaluate(&unit("atop", &[]), &nothing_installed(), HOST),
            Decision::Install { forced: false }
        );
    }

    #[test]
    fn test_skip_by_flag() {
        let selection = Selection {
            skip_flags: [Flag::Virtual].into(),
            ..Selection::default()
        };
        assert_eq!(
            selection.evaluate(&unit("dotfiles", &[Flag::Virtual, Flag::Lead]), &nothing_installed(), HOST),
            Decision::Skip(SkipReason::SkippedByFlag { flag: Flag::Virtual })
        );
        assert!(!selection.evaluate(&unit("atop", &[Flag::Lead]), &nothing_installed(), HOST).is_skip());
    }

    #[test]
    fn test_only_names() {
        let selection = Selection {
            only_names: ["vim".to_string()].into(),
            ..Selection::default()
        };
        assert_eq!(
            selection.evaluate(&unit("emacs", &[]), &nothing_installed(), HOST),
            Decision::Skip(SkipReason::NotInOnlyNames)
        );
        assert!(!selection.evaluate(&unit("vim", &[]), &nothing_installed(), HOST).is_skip());
    }

    #[test]
    fn test_only_flags() {
        let selection = Selection {
            only_flags: [Flag::Lead].into(),
            ..Selection::default()
        };
        assert_eq!(
            selection.evaluate(&unit("emacs", &[]), &nothing_installed(), HOST),
            Decision::Skip(SkipReason::NotInOnlyFlags)
        );
        assert!(!selection.evaluate(&unit("docker", &[Flag::Lead]), &nothing_installed(), HOST).is_skip());
    }

    #[test]
    fn test_skip_by_name_beats_only_names() {
        let selection = Selection {
            skip_names: ["vim".to_string()].into(),
            only_names: ["vim".to_string()].into(),
            ..Selection::default()
        };
        assert_eq!(
            selection.evaluate(&unit("vim", &[]), &nothing_installed(), HOST),
            Decision::Skip(SkipReason::SkippedByName)
        );
    }

    #[test]
    fn test_installed_beats_skip_flag() {
        let installed = InstalledSet::from_iter(["atop"]);
        assert_eq!(
            Selection::default().evaluate(&unit("atop", &[Flag::Skip]), &installed, HOST),
            Decision::Skip(SkipReason::AlreadyInstalled)
        );
    }

    #[test]
    fn test_force_all_beats_hostname_and_filters() {
        let selection = Selection {
            force_all: true,
            skip_names: ["db".to_string()].into(),
            ..Selection::default()
        };
        let mut db = unit("db", &[Flag::Skip]);
        db.host_patterns = ["!*.example.org".to_string()].into();
        let installed = InstalledSet::from_iter(["db"]);

        let decision = selection.evaluate(&db, &installed, HOST);
        assert_eq!(decision, Decision::Install { forced: true });
        assert!(decision.is_forced());
    }

    #[test]
    fn test_hostname_is_last_rule() {
        let mut unit = unit("db", &[]);
        unit.host_patterns = ["db01".to_string()].into();
        assert_eq!(
            Selection::default().evaluate(&unit, &nothing_installed(), HOST),
            Decision::Skip(SkipReason::Hostname)
        );
    }

    #[test]
    fn test_decision_reason_strings() {
        assert_eq!(Decision::Install { forced: true }.reason(), "forcing");
        assert_eq!(Decision::Skip(SkipReason::AlreadyInstalled).reason(), "already installed");
        assert_eq!(Decision::Skip(SkipReason::Hostname).reason(), "hostname");
    }
}
