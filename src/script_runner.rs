//! External command execution.
//!
//! All external processes go through [`run_captured`] or [`run_inherited`]
//! so that each one:
//!
//! - runs in its own process group (see [`CommandProcessGroup`])
//! - is registered with the [`ChildRegistry`] while it runs, so an
//!   interrupt can terminate it
//! - has its exit status turned into an error carrying the exit code
//!
//! [`ShellScriptRunner`] is the unit-script collaborator built on top.

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use anyhow::{Context, Result};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Runs unit `pre:`/`post:` command text.
pub trait ScriptRunner {
    /// Run `command_text` with the process environment. A non-zero exit
    /// is an error carrying the exit code.
    fn run(&self, command_text: &str) -> Result<()>;
}

/// Runs command text with `bash -c`, output going straight to the terminal.
#[derive(Debug, Clone)]
pub struct ShellScriptRunner {
    shell: String,
}

impl ShellScriptRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellScriptRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

impl ScriptRunner for ShellScriptRunner {
    fn run(&self, command_text: &str) -> Result<()> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command_text);
        let status = run_inherited(&mut cmd, "script")?;
        ensure_status(status, "script")
    }
}

/// Output of a captured command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Return an error naming `context` if the command failed.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            anyhow::bail!(
                "{} failed ({}): {}",
                context,
                describe_exit(self.exit_code),
                self.stderr.trim()
            )
        }
    }
}

/// Turn an inherited-stdio exit status into a result.
pub fn ensure_status(status: ExitStatus, context: &str) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        anyhow::bail!("{} failed ({})", context, describe_exit(status.code()))
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Run `cmd` with stdout/stderr captured.
pub fn run_captured(cmd: &mut Command, what: &str) -> Result<CommandOutput> {
    tracing::debug!("run_captured [{}]: {:?}", what, cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}: {:?}", what, cmd.get_program()))?;
    let pid = register(&child);
    let output = child.wait_with_output();
    unregister(pid);
    let output = output.with_context(|| format!("Failed waiting for {}", what))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Run `cmd` with the terminal's stdio.
pub fn run_inherited(cmd: &mut Command, what: &str) -> Result<ExitStatus> {
    tracing::debug!("run_inherited [{}]: {:?}", what, cmd);
    cmd.stdin(Stdio::null()).in_new_process_group();

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}: {:?}", what, cmd.get_program()))?;
    let pid = register(&child);
    let status = child.wait();
    unregister(pid);
    status.with_context(|| format!("Failed waiting for {}", what))
}

fn register(child: &Child) -> u32 {
    let pid = child.id();
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }
    pid
}

fn unregister(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}
