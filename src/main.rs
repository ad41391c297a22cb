//! packlist - Main entry point
//!
//! Parses a package-list document and provisions this host from it.

use clap::Parser as _;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use packlist::cli::{Cli, Commands, SelectArgs};
use packlist::config_file::Config;
use packlist::error::{PackListError, Result};
use packlist::{
    plan, process_guard, sanity, AptPackageManager, AptRepositoryRegistrar, Backend, HttpRetriever,
    DpkgArchiveInstaller, InstalledSet, Parser, Registry, RunReport, Scheduler, SemaphoreStore,
    Sequencer, ShellScriptRunner,
};

/// Initialize tracing. `-v`/`-vv` raise the default level; RUST_LOG wins.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Children get terminated on SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = process_guard::ProcessGuard::new();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("✗ {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Dispatch a command. `Ok(false)` means the run finished with failed units.
fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(cli.config.as_deref()).map_err(|e| PackListError::config(format!("{:#}", e)))?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Validate { file } => {
            let registry = load_document(&file, &config, None)?;
            println!("✓ {}: {} unit(s)", file.display(), registry.len());
            Ok(true)
        }
        Commands::Plan { file, select, json } => {
            let registry = load_document(&file, &config, Some(&select))?;
            let installed = InstalledSet::snapshot(&AptPackageManager).map_err(PackListError::environment)?;
            let hostname = resolve_hostname(&select)?;
            let entries = plan(&registry, &select.selection(), &installed, &hostname);

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!(
                        "{:>5}  {:<5}  {:<30}  {}",
                        entry.line,
                        entry.bucket,
                        entry.name,
                        entry.decision.reason()
                    );
                }
            }
            Ok(true)
        }
        Commands::Install {
            file,
            select,
            stop_on_error,
            semaphore_dir,
        } => {
            let mut registry = load_document(&file, &config, Some(&select))?;
            let semaphores = SemaphoreStore::new(semaphore_dir.unwrap_or_else(|| config.semaphore_dir.clone()));
            let stop_on_error = stop_on_error || config.stop_on_error;
            let report = install(&mut registry, &select, &semaphores, stop_on_error, cli.dry_run, &config)?;

            println!();
            println!("{}", report.summary());
            Ok(!report.has_failures())
        }
    }
}

fn load_document(path: &Path, config: &Config, select: Option<&SelectArgs>) -> Result<Registry> {
    let text = fs::read_to_string(path)?;
    let sources_dir = select
        .and_then(|s| s.sources_dir.clone())
        .unwrap_or_else(|| config.sources_dir.clone());
    Parser::new(sources_dir)
        .parse(&text)
        .map_err(|e| PackListError::parse(path.display().to_string(), e))
}

fn resolve_hostname(select: &SelectArgs) -> Result<String> {
    if let Some(name) = &select.hostname {
        return Ok(name.clone());
    }
    let name = nix::unistd::gethostname()
        .map_err(|e| PackListError::environment(format!("Failed to read hostname: {}", e)))?;
    Ok(name.to_string_lossy().into_owned())
}

fn install(
    registry: &mut Registry,
    select: &SelectArgs,
    semaphores: &SemaphoreStore,
    stop_on_error: bool,
    dry_run: bool,
    config: &Config,
) -> Result<RunReport> {
    if dry_run {
        info!("Dry-run mode: no changes will be made");
    } else {
        let check = sanity::verify_environment(!config.should_skip_root_check());
        if !check.is_ok() {
            return Err(PackListError::environment(check.describe()));
        }
    }

    // Downloaded archives live here until the run ends
    let work_dir = tempfile::Builder::new()
        .prefix("packlist-")
        .tempdir()
        .map_err(|e| PackListError::environment(format!("Failed to create work directory: {}", e)))?;
    debug!("Work directory: {}", work_dir.path().display());

    let packages = AptPackageManager;
    let archives = DpkgArchiveInstaller;
    let retriever = HttpRetriever::new(work_dir.path());
    let repositories = AptRepositoryRegistrar;
    let scripts = ShellScriptRunner::default();
    let backend = Backend {
        packages: &packages,
        archives: &archives,
        retriever: &retriever,
        repositories: &repositories,
        scripts: &scripts,
    };

    let installed = InstalledSet::snapshot(&packages).map_err(PackListError::environment)?;
    info!("{} package(s) installed on this host", installed.len());
    let hostname = resolve_hostname(select)?;
    let selection = select.selection();

    let sequencer = Sequencer {
        backend,
        selection: &selection,
        installed: &installed,
        semaphores,
        hostname: &hostname,
        dry_run,
    };
    let mut scheduler = Scheduler::new(sequencer, stop_on_error);
    let result = scheduler.run(registry, |unit| {
        println!("{}", unit.status_line());
        if dry_run {
            for action in &unit.actions {
                println!("    would {}", action);
            }
        }
    });

    // Units finished before an abort still get summarized
    if result.is_err() {
        println!();
        println!("{}", scheduler.report().summary());
    }
    result
}
