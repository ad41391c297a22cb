use crate::selection::Selection;
use crate::types::Flag;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// packlist - provision a host from a package-list document
#[derive(Parser, Debug)]
#[command(name = "packlist")]
#[command(about = "Install and configure packages declared in a package-list document")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: evaluate every unit and print what would be done.
    ///
    /// The document is fully parsed and every skip decision is made, but no
    /// repository, source file, script, download or install is touched.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Configuration file (default: /etc/packlist/config.json if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install every selected unit of a package list
    Install {
        /// Package-list document
        file: PathBuf,

        #[command(flatten)]
        select: SelectArgs,

        /// Abort the whole run at the first failed unit
        #[arg(long)]
        stop_on_error: bool,

        /// Directory holding run-once semaphore markers
        #[arg(long)]
        semaphore_dir: Option<PathBuf>,
    },
    /// Parse a package list and report syntax errors
    Validate {
        /// Package-list document
        file: PathBuf,
    },
    /// Show execution order and skip decisions without running anything
    Plan {
        /// Package-list document
        file: PathBuf,

        #[command(flatten)]
        select: SelectArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Selection options shared by `install` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Install units even when already installed or filtered out
    #[arg(long)]
    pub force_all: bool,

    /// Skip these units (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Skip units carrying any of these flags (comma-separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_flag)]
    pub skip_flags: Vec<Flag>,

    /// Only consider these units (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Only consider units carrying any of these flags (comma-separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_flag)]
    pub only_flags: Vec<Flag>,

    /// Hostname used for `hosts:` matching (default: this machine)
    #[arg(long)]
    pub hostname: Option<String>,

    /// Directory that `source:` files are written to
    #[arg(long)]
    pub sources_dir: Option<PathBuf>,
}

impl SelectArgs {
    pub fn selection(&self) -> Selection {
        let names = |list: &[String]| {
            list.iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Selection {
            force_all: self.force_all,
            skip_names: names(&self.skip),
            skip_flags: self.skip_flags.iter().copied().collect(),
            only_names: names(&self.only),
            only_flags: self.only_flags.iter().copied().collect(),
        }
    }
}

fn parse_flag(token: &str) -> Result<Flag, String> {
    Flag::parse_token(token)
        .ok_or_else(|| format!("unknown flag `{}` (valid: {})", token, Flag::valid_tokens()))
}
