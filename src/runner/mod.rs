//! Command runners for the external tools rivet drives (git, docker).
//!
//! The [`CommandRunner`] trait is the only resource shared between
//! repository tasks, so implementations must be stateless between calls.

mod process;
pub mod scripted;

pub use process::ProcessRunner;
pub use scripted::{Reply, ScriptedRunner};

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exit code reported when a command never produced one.
pub const NO_EXIT_CODE: i32 = -1;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Process exit code, or [`NO_EXIT_CODE`] if killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Failure modes of a single command invocation.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The command ran and exited non-zero.
    #[error("command '{command}' failed with exit code {}: {}", .output.exit_code, .output.stderr.trim())]
    Exited {
        command: String,
        output: CommandOutput,
    },

    /// The command could not be started.
    #[error("failed to run command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Cancellation fired before or while the command ran.
    #[error("command '{command}' cancelled")]
    Cancelled { command: String },
}

impl RunnerError {
    /// Exit code of the failed command; [`NO_EXIT_CODE`] if it never exited.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Exited { output, .. } => output.exit_code,
            RunnerError::Spawn { .. } | RunnerError::Cancelled { .. } => NO_EXIT_CODE,
        }
    }

    /// Captured standard error, empty if the command never ran.
    pub fn stderr(&self) -> &str {
        match self {
            RunnerError::Exited { output, .. } => &output.stderr,
            RunnerError::Spawn { .. } | RunnerError::Cancelled { .. } => "",
        }
    }

    /// The rendered command line.
    pub fn command(&self) -> &str {
        match self {
            RunnerError::Exited { command, .. }
            | RunnerError::Spawn { command, .. }
            | RunnerError::Cancelled { command } => command,
        }
    }
}

/// Renders a program and its arguments as a single command line.
pub fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Trait for running external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` inside `working_dir` (the process's own
    /// directory when `None`) and captures its output.
    ///
    /// A non-zero exit is returned as [`RunnerError::Exited`] with the full
    /// captured output. Cancellation resolves in favor of `cancel` when both
    /// the command and the token are ready.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_command_joins_args() {
        let args = vec!["rev-parse".to_string(), "HEAD".to_string()];
        assert_eq!(render_command("git", &args), "git rev-parse HEAD");
        assert_eq!(render_command("git", &[]), "git");
    }

    #[test]
    fn spawn_and_cancel_report_no_exit_code() {
        let spawn = RunnerError::Spawn {
            command: "nope".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let cancelled = RunnerError::Cancelled {
            command: "git fetch".to_string(),
        };

        assert_eq!(spawn.exit_code(), NO_EXIT_CODE);
        assert_eq!(cancelled.exit_code(), NO_EXIT_CODE);
        assert_eq!(spawn.stderr(), "");
    }

    #[test]
    fn exited_error_embeds_stderr() {
        let err = RunnerError::Exited {
            command: "git pull origin main --ff-only".to_string(),
            output: CommandOutput {
                stdout: String::new(),
                stderr: "fatal: Not possible to fast-forward\n".to_string(),
                exit_code: 128,
            },
        };

        assert_eq!(err.exit_code(), 128);
        let msg = err.to_string();
        assert!(msg.contains("exit code 128"));
        assert!(msg.contains("Not possible to fast-forward"));
    }
}
