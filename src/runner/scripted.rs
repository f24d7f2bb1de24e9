//! Scripted runner for exercising repository lifecycles without git or docker.
//!
//! Replies are chosen by matching the rendered command line against rule
//! prefixes in insertion order. Unmatched commands succeed with empty output.
//! Every invocation is recorded for later assertions.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{render_command, CommandOutput, CommandRunner, RunnerError};

/// A recorded call to [`ScriptedRunner::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub working_dir: Option<PathBuf>,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The rendered command line, e.g. `git rev-parse HEAD`.
    pub fn command_line(&self) -> String {
        render_command(&self.program, &self.args)
    }
}

/// How the scripted runner answers a matching command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Exit 0 with the given stdout.
    Stdout(String),
    /// Exit with a non-zero code and stderr.
    Exit { code: i32, stderr: String },
    /// Fail as if the binary could not be started.
    SpawnFailure,
    /// Block until the cancellation token fires.
    Hang,
}

impl Reply {
    /// Exit 0 with no output.
    pub fn ok() -> Self {
        Reply::Stdout(String::new())
    }

    /// Exit 0 printing `stdout`.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Reply::Stdout(stdout.into())
    }

    /// Exit with `code`, printing `stderr`.
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Reply::Exit {
            code,
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    working_dir: Option<PathBuf>,
    reply: Reply,
    once: bool,
}

impl Rule {
    fn matches(&self, working_dir: Option<&Path>, line: &str) -> bool {
        if !line.starts_with(&self.prefix) {
            return false;
        }
        match &self.working_dir {
            Some(expected) => working_dir == Some(expected.as_path()),
            None => true,
        }
    }
}

/// A [`CommandRunner`] that answers from a script and records every call.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds silently.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every command starting with `prefix` with `reply`.
    pub fn on(self, prefix: impl Into<String>, reply: Reply) -> Self {
        self.push(prefix.into(), None, reply, false)
    }

    /// Like [`ScriptedRunner::on`], restricted to commands run in `dir`.
    pub fn on_in(self, dir: impl Into<PathBuf>, prefix: impl Into<String>, reply: Reply) -> Self {
        self.push(prefix.into(), Some(dir.into()), reply, false)
    }

    /// Answers only the next command starting with `prefix`.
    pub fn once(self, prefix: impl Into<String>, reply: Reply) -> Self {
        self.push(prefix.into(), None, reply, true)
    }

    fn push(self, prefix: String, working_dir: Option<PathBuf>, reply: Reply, once: bool) -> Self {
        lock(&self.rules).push(Rule {
            prefix,
            working_dir,
            reply,
            once,
        });
        self
    }

    /// Returns every recorded invocation in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Returns the rendered command lines in call order.
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(Invocation::command_line).collect()
    }

    /// Counts recorded commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.command_line().starts_with(prefix))
            .count()
    }

    /// Counts recorded commands starting with `prefix` that ran in `dir`.
    pub fn count_in(&self, dir: &Path, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.working_dir.as_deref() == Some(dir))
            .filter(|call| call.command_line().starts_with(prefix))
            .count()
    }

    fn reply_for(&self, working_dir: Option<&Path>, line: &str) -> Reply {
        let mut rules = lock(&self.rules);
        match rules.iter().position(|rule| rule.matches(working_dir, line)) {
            Some(index) if rules[index].once => rules.remove(index).reply,
            Some(index) => rules[index].reply.clone(),
            None => Reply::ok(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, RunnerError> {
        let command = render_command(program, args);
        lock(&self.calls).push(Invocation {
            working_dir: working_dir.map(Path::to_path_buf),
            program: program.to_string(),
            args: args.to_vec(),
        });

        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled { command });
        }

        match self.reply_for(working_dir, &command) {
            Reply::Stdout(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            }),
            Reply::Exit { code, stderr } => Err(RunnerError::Exited {
                command,
                output: CommandOutput {
                    stdout: String::new(),
                    stderr,
                    exit_code: code,
                },
            }),
            Reply::SpawnFailure => Err(RunnerError::Spawn {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            Reply::Hang => {
                cancel.cancelled().await;
                Err(RunnerError::Cancelled { command })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn unmatched_commands_succeed_and_are_recorded() {
        let runner = ScriptedRunner::new();
        let cancel = CancellationToken::new();

        let output = runner
            .execute(&cancel, None, "git", &args("status"))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(runner.command_lines(), vec!["git status"]);
    }

    #[tokio::test]
    async fn once_rules_are_consumed_before_persistent_ones() {
        let runner = ScriptedRunner::new()
            .once("git rev-parse HEAD", Reply::stdout("abc123\n"))
            .on("git rev-parse HEAD", Reply::stdout("def456\n"));
        let cancel = CancellationToken::new();

        let first = runner
            .execute(&cancel, None, "git", &args("rev-parse HEAD"))
            .await
            .unwrap();
        let second = runner
            .execute(&cancel, None, "git", &args("rev-parse HEAD"))
            .await
            .unwrap();

        assert_eq!(first.stdout.trim(), "abc123");
        assert_eq!(second.stdout.trim(), "def456");
    }

    #[tokio::test]
    async fn directory_rules_only_match_their_directory() {
        let runner = ScriptedRunner::new().on_in("/srv/a", "git fetch", Reply::exit(128, "offline"));
        let cancel = CancellationToken::new();

        let in_a = runner
            .execute(&cancel, Some(Path::new("/srv/a")), "git", &args("fetch origin main"))
            .await;
        let in_b = runner
            .execute(&cancel, Some(Path::new("/srv/b")), "git", &args("fetch origin main"))
            .await;

        assert_eq!(in_a.unwrap_err().exit_code(), 128);
        assert!(in_b.is_ok());
        assert_eq!(runner.count_in(Path::new("/srv/a"), "git fetch"), 1);
        assert_eq!(runner.count("git fetch"), 2);
    }

    #[tokio::test]
    async fn hang_resolves_on_cancellation() {
        let runner = ScriptedRunner::new().on("docker", Reply::Hang);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });

        let err = runner
            .execute(&cancel, None, "docker", &args("compose build"))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Cancelled { .. }));
    }
}
