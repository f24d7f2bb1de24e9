//! Runner backed by real child processes.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{render_command, CommandOutput, CommandRunner, RunnerError, NO_EXIT_CODE};

/// Runs commands as child processes of rivet.
///
/// Children are spawned with `kill_on_drop`, so abandoning the wait on
/// cancellation also asks the child to terminate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, RunnerError> {
        let command = render_command(program, args);

        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled { command });
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %command, working_dir = ?working_dir, "running command");

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => return Err(RunnerError::Spawn { command, source }),
        };

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(command = %command, "cancellation requested; killing process");
                return Err(RunnerError::Cancelled { command });
            }
            result = child.wait_with_output() => match result {
                Ok(output) => output,
                Err(source) => return Err(RunnerError::Spawn { command, source }),
            },
        };

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(NO_EXIT_CODE),
        };

        if output.success() {
            Ok(output)
        } else {
            Err(RunnerError::Exited { command, output })
        }
    }
}
