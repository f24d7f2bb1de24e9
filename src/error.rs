//! Error types for rivet.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A step of the repository lifecycle that shells out to an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Clone,
    Fetch,
    ResolveLocal,
    ResolveRemote,
    AncestorCheck,
    Pull,
    Build,
    ScaleUp,
    ScaleDown,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Clone => "clone",
            Step::Fetch => "fetch",
            Step::ResolveLocal => "resolve local HEAD",
            Step::ResolveRemote => "resolve remote HEAD",
            Step::AncestorCheck => "ancestor check",
            Step::Pull => "pull",
            Step::Build => "build",
            Step::ScaleUp => "scale up",
            Step::ScaleDown => "scale down",
        };
        f.write_str(name)
    }
}

/// Details of an external command that exited non-zero or never started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// Lifecycle step that issued the command.
    pub step: Step,
    /// The rendered command line.
    pub command: String,
    /// Exit code, or -1 if the process could not be started.
    pub exit_code: i32,
    /// Captured standard error.
    pub stderr: String,
    /// Runner-level description of the failure.
    pub detail: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (exit {}): {}",
            self.step, self.exit_code, self.detail
        )
    }
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Path resolution, creation, or probing failed.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external command exited non-zero or could not be spawned.
    #[error("{0}")]
    Command(CommandFailure),

    /// An operation requiring a working copy ran before initialization.
    #[error("repository not initialized, call ensure_initialized first")]
    NotInitialized,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns true when the failure may have left a service over-scaled.
    pub fn is_critical(&self) -> bool {
        matches!(self, Error::Command(failure) if failure.step == Step::ScaleDown)
    }

    /// Returns the failed command's details, if this is a command error.
    pub fn command_failure(&self) -> Option<&CommandFailure> {
        match self {
            Error::Command(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type alias for rivet operations.
pub type Result<T> = std::result::Result<T, Error>;
