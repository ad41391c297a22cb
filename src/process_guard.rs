//! Child process bookkeeping and interrupt handling.
//!
//! Every external command (package manager, repository tool, download,
//! unit scripts) is spawned in its own process group and registered here
//! while it runs. On SIGINT/SIGTERM/SIGHUP the signal thread:
//!
//! - raises the interrupt flag checked by the lifecycle sequencer between steps
//! - terminates every registered process group (SIGTERM, grace period, SIGKILL)
//!
//! The run then unwinds normally, so the temporary work directory and other
//! scoped resources are released before the process exits. A second signal
//! while unwinding exits immediately.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Raised by the signal thread
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Grace period between SIGTERM and SIGKILL on interrupt
const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// Whether an interrupt signal has been received.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Registry tracking running child process groups
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::trace!("Registered child process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::trace!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked process groups.
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let mut remaining: Vec<u32> = self.pids.drain().collect();
        for &pid in &remaining {
            signal_group(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        loop {
            remaining.retain(|&pid| is_process_alive(pid));
            if remaining.is_empty() {
                tracing::info!("All child processes terminated");
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for pid in remaining {
            tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
            signal_group(pid, Signal::SIGKILL);
        }
    }
}

/// Signal the process group led by `pid` (reaching dpkg under apt-get and
/// commands under bash), falling back to the process alone.
fn signal_group(pid: u32, sig: Signal) {
    let raw = pid as i32;
    if let Err(e) = signal::kill(Pid::from_raw(-raw), sig) {
        tracing::debug!("Group signal {} to {} failed ({}), signalling the process", sig, pid, e);
        let _ = signal::kill(Pid::from_raw(raw), sig);
    }
}

/// True while `pid` exists and is not a zombie.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            // State follows the parenthesised command name
            let state = stat.rsplit_once(')')?.1.split_whitespace().next()?.to_string();
            Some(!matches!(state.as_str(), "Z" | "X"))
        })
        .unwrap_or(true)
}

/// RAII guard held by `main`; terminates leftover children on drop.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(Duration::from_secs(5));
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP. Call once at startup.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if INTERRUPTED.swap(true, Ordering::SeqCst) {
                tracing::warn!("Second signal received, exiting immediately");
                std::process::exit(128 + sig);
            }

            tracing::warn!("Received signal {}, aborting run...", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(INTERRUPT_GRACE);
            }
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe functions.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
