//! packlist library
//!
//! Parses a package-list document into units, decides which units apply to
//! this host, and drives each selected unit through its install lifecycle
//! (repositories, source files, scripts, download, install) in lead, main
//! and trail order, with run-once tracking for scripts.

pub mod cli;
pub mod config_file;
pub mod error;
pub mod fetch;
pub mod installed;
pub mod lifecycle;
pub mod package_manager;
pub mod parser;
pub mod process_guard;
pub mod registry;
pub mod report;
pub mod repository;
pub mod sanity;
pub mod scheduler;
pub mod script_runner;
pub mod selection;
pub mod semaphore;
pub mod types;
pub mod unit;

// Re-export main types for convenience
pub use config_file::Config;
pub use error::PackListError;
pub use fetch::{HttpRetriever, Retriever};
pub use installed::InstalledSet;
pub use lifecycle::{Backend, Sequencer};
pub use package_manager::{AptPackageManager, ArchiveInstaller, DpkgArchiveInstaller, PackageManager};
pub use parser::{parse_document, ParseError, Parser};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use registry::Registry;
pub use report::{RunReport, Step, StepFailure, UnitOutcome, UnitReport};
pub use repository::{AptRepositoryRegistrar, RepositoryRegistrar};
pub use scheduler::{plan, PlanEntry, Scheduler, SchedulerState};
pub use script_runner::{ScriptRunner, ShellScriptRunner};
pub use selection::{host_matches, Decision, Selection, SkipReason};
pub use semaphore::SemaphoreStore;
pub use types::{Bucket, Flag, InstallMethod, ScriptPhase};
pub use unit::{SourceEntry, Unit};
