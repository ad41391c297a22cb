//! Pre-flight checks before `install` touches the host:
//! - Running with root privileges (EUID 0), unless skipped
//! - Required runtime binaries are on PATH

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    pub root_required: bool,
}

impl SanityCheckResult {
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && (self.is_root || !self.root_required)
    }

    /// Multi-line diagnostic for a failed check.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if self.root_required && !self.is_root {
            lines.push("Root privileges required (run with sudo, or set PACKLIST_SKIP_ROOT_CHECK=1)".to_string());
        }
        for binary in &self.missing_binaries {
            lines.push(format!(
                "Missing required binary: {} (install: apt-get install {})",
                binary,
                package_for_binary(binary)
            ));
        }
        lines.join("\n")
    }
}

/// Binaries the Debian collaborators cannot work without
const REQUIRED_BINARIES: &[&str] = &["bash", "dpkg-query", "apt-get"];

/// Needed only by units using `repo:` or `deb:` (warn if missing)
const OPTIONAL_BINARIES: &[&str] = &["add-apt-repository", "dpkg-deb"];

/// Check if a binary is available in PATH
pub fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "bash" => "bash",
        "dpkg-query" | "dpkg-deb" => "dpkg",
        "apt-get" => "apt",
        "add-apt-repository" => "software-properties-common",
        _ => "unknown",
    }
}

/// Run all checks.
pub fn verify_environment(root_required: bool) -> SanityCheckResult {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| b.to_string())
        .collect();

    for binary in OPTIONAL_BINARIES {
        if !binary_exists(binary) {
            tracing::warn!(
                "Optional binary not found: {} (needed for repo:/deb: units)",
                binary
            );
        }
    }

    SanityCheckResult {
        missing_binaries,
        is_root: nix::unistd::geteuid().is_root(),
        root_required,
    }
}
