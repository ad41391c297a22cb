//! Error types for packlist.
//!
//! Document problems are [`ParseError`]s and never reach execution. Step
//! failures inside a unit's lifecycle are recorded in the run report, not
//! raised. Everything that ends a run early is a [`PackListError`].

use crate::parser::ParseError;
use thiserror::Error;

/// Errors that end a run.
#[derive(Error, Debug)]
pub enum PackListError {
    /// IO errors (reading the document, writing files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed package-list document
    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },

    /// Configuration file problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run's own bookkeeping is unreliable (work directory, semaphores)
    #[error("Environment error: {0}")]
    Environment(String),

    /// A unit failed while stop-on-error was set
    #[error("Aborted: unit '{unit}' failed: {reason}")]
    Aborted { unit: String, reason: String },

    /// SIGINT/SIGTERM/SIGHUP received
    #[error("Interrupted by signal")]
    Interrupted,

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for packlist operations
pub type Result<T> = std::result::Result<T, PackListError>;

impl PackListError {
    pub fn parse(path: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an environment error from an anyhow chain, keeping every cause.
    pub fn environment(err: impl std::fmt::Display) -> Self {
        Self::Environment(format!("{:#}", err))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            Self::Parse { .. } | Self::Config(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PackListError::parse(
            "packages.txt",
            ParseError::EmptyUnitName { line: 4 },
        );
        assert_eq!(err.to_string(), "packages.txt: line 4: empty unit name");

        let err = PackListError::Aborted {
            unit: "emacs".to_string(),
            reason: "install failed".to_string(),
        };
        assert_eq!(err.to_string(), "Aborted: unit 'emacs' failed: install failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PackListError = io_err.into();
        assert!(matches!(err, PackListError::Io(_)));
    }

    #[test]
    fn test_environment_keeps_cause_chain() {
        let err = anyhow::anyhow!("dpkg-query: not found").context("Failed to list installed packages");
        let text = PackListError::environment(err).to_string();
        assert!(text.contains("Failed to list installed packages"), "{text}");
        assert!(text.contains("dpkg-query: not found"), "{text}");
    }

    #[test]
    fn test_exit_codes_are_nonzero() {
        assert_eq!(PackListError::Interrupted.exit_code(), 130);
        assert_eq!(PackListError::config("bad").exit_code(), 2);
        assert_eq!(PackListError::environment("no semaphore dir").exit_code(), 1);
    }
}
