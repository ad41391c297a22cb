//! Closed vocabularies of the package-list document.
//!
//! Every token the document can carry in a `flags:` directive, and every
//! enumerated choice the engine makes, is a Rust enum here. Raw strings are
//! parsed once at the boundary and never travel further.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Per-unit flag accepted by the `flags:` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// Run in the lead bucket, before untagged units
    #[strum(serialize = "lead")]
    Lead,
    /// Run in the trail bucket, after untagged units
    #[strum(serialize = "trail")]
    Trail,
    /// Install even when already installed or filtered out
    #[strum(serialize = "force")]
    Force,
    /// Never install
    #[strum(serialize = "skip")]
    Skip,
    /// No package-manager install step (scripts only)
    #[strum(serialize = "virtual")]
    Virtual,
    /// Run the pre-install script at most once per host
    #[strum(serialize = "pre_once")]
    PreScriptOnce,
    /// Run the post-install script at most once per host
    #[strum(serialize = "post_once")]
    PostScriptOnce,
    /// Run both scripts at most once per host
    #[strum(serialize = "once")]
    BothScriptsOnce,
}

impl Flag {
    /// Parse a single document token, trimming surrounding whitespace.
    pub fn parse_token(token: &str) -> Option<Self> {
        token.trim().parse().ok()
    }

    /// Canonical token list, used in diagnostics.
    pub fn valid_tokens() -> String {
        Flag::iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// How a unit's payload reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Installed by name through the system package manager
    #[default]
    #[strum(serialize = "package manager")]
    PackageManager,
    /// Retrieved from a URL and installed as a local archive
    #[strum(serialize = "downloaded archive")]
    DownloadedArchive,
}

/// Which of the two scripted hooks a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    #[strum(serialize = "pre-install")]
    Pre,
    #[strum(serialize = "post-install")]
    Post,
}

impl ScriptPhase {
    /// The flag that makes only this phase run-once.
    pub const fn once_flag(self) -> Flag {
        match self {
            Self::Pre => Flag::PreScriptOnce,
            Self::Post => Flag::PostScriptOnce,
        }
    }
}

/// Scheduling bucket a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum Bucket {
    Lead,
    Main,
    Trail,
}

impl Bucket {
    /// Buckets in execution order.
    pub const fn ordered() -> [Self; 3] {
        [Self::Lead, Self::Main, Self::Trail]
    }

    /// Bucket implied by a unit's flags. `Lead` wins if both are present.
    pub fn for_flags<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> Self {
        let mut bucket = Self::Main;
        for flag in flags {
            match flag {
                Flag::Lead => return Self::Lead,
                Flag::Trail => bucket = Self::Trail,
                _ => {}
            }
        }
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_tokens_are_case_insensitive() {
        assert_eq!(Flag::parse_token("Force"), Some(Flag::Force));
        assert_eq!(Flag::parse_token(" POST_ONCE "), Some(Flag::PostScriptOnce));
        assert_eq!(Flag::parse_token("once"), Some(Flag::BothScriptsOnce));
    }

    #[test]
    fn test_legacy_flag_names_rejected() {
        assert_eq!(Flag::parse_token("no_apt"), None);
        assert_eq!(Flag::parse_token(""), None);
    }

    #[test]
    fn test_bucket_for_flags() {
        assert_eq!(Bucket::for_flags(&[Flag::Force]), Bucket::Main);
        assert_eq!(Bucket::for_flags(&[Flag::Trail]), Bucket::Trail);
        assert_eq!(Bucket::for_flags(&[Flag::Trail, Flag::Lead]), Bucket::Lead);
    }

    #[test]
    fn test_valid_tokens_lists_every_flag() {
        let tokens = Flag::valid_tokens();
        for flag in Flag::iter() {
            assert!(tokens.contains(&flag.to_string()));
        }
    }
}
