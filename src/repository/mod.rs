//! Per-repository lifecycle: clone, detect fast-forward updates, pull,
//! rebuild, and roll the compose service.
//!
//! A [`RepositoryController`] is driven by exactly one monitoring task, so
//! its cached working path and initialized flag need no synchronization.

pub mod compose;
pub mod git;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::RepositoryConfig;
use crate::error::{CommandFailure, Error, Result, Step};
use crate::runner::{CommandOutput, CommandRunner, RunnerError};

use compose::{ScalePlan, DOCKER, SETTLE_DELAY};
use git::{Ancestry, GIT, GIT_DIR};

/// Result of one successful monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No fast-forward was available.
    UpToDate,
    /// The update was pulled, built, and rolled out.
    Deployed,
}

/// Drives the lifecycle of one watched repository.
pub struct RepositoryController<R: CommandRunner> {
    /// Settings for this repository.
    config: RepositoryConfig,
    /// Shared command runner.
    runner: Arc<R>,
    /// Absolute clone location, resolved on first use.
    working_path: Option<PathBuf>,
    /// Set once a working copy is known to exist; never cleared.
    initialized: bool,
    /// Instance counts for the rolling deploy.
    scale: ScalePlan,
}

impl<R: CommandRunner> RepositoryController<R> {
    /// Creates a controller for `config` backed by the shared `runner`.
    pub fn new(config: RepositoryConfig, runner: Arc<R>) -> Self {
        Self {
            config,
            runner,
            working_path: None,
            initialized: false,
            scale: ScalePlan::default(),
        }
    }

    /// Returns the repository settings.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Returns whether a working copy has been cloned or detected.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn absolute_base_path(&self) -> Result<PathBuf> {
        let base = &self.config.base_path;
        if base.is_absolute() {
            return Ok(base.clone());
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(base))
            .map_err(|source| Error::Filesystem {
                path: base.clone(),
                source,
            })
    }

    /// Resolves and caches the absolute clone location.
    pub fn working_path(&mut self) -> Result<&Path> {
        let path = match self.working_path.take() {
            Some(path) => path,
            None => {
                if self.config.base_path.as_os_str().is_empty()
                    || self.config.clone_dir_name.is_empty()
                {
                    return Err(Error::Config(
                        "basePath or cloneDirName is empty in repository config".to_string(),
                    ));
                }
                self.absolute_base_path()?.join(&self.config.clone_dir_name)
            }
        };
        Ok(self.working_path.insert(path).as_path())
    }

    fn require_initialized(&self) -> Result<&Path> {
        match (&self.working_path, self.initialized) {
            (Some(path), true) => Ok(path),
            _ => Err(Error::NotInitialized),
        }
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        step: Step,
        dir: &Path,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput> {
        let output = self
            .runner
            .execute(cancel, Some(dir), program, args)
            .await
            .map_err(|err| command_error(step, err))?;
        tracing::debug!(step = %step, stdout = %output.stdout.trim(), "command succeeded");
        Ok(output)
    }

    /// Makes sure a working copy exists, cloning it if needed.
    ///
    /// Idempotent: once initialized, returns immediately without touching
    /// the disk or the network.
    pub async fn ensure_initialized(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let working_path = self.working_path()?.to_path_buf();
        tracing::info!(path = %working_path.display(), "ensuring repository is cloned");

        // Any existing `.git` entry counts as a clone; only not-found
        // falls through to cloning.
        let git_dir = working_path.join(GIT_DIR);
        match std::fs::metadata(&git_dir) {
            Ok(_) => {
                tracing::info!(path = %working_path.display(), "repository already exists");
                self.initialized = true;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Filesystem {
                    path: git_dir,
                    source,
                })
            }
        }

        let base = self.absolute_base_path()?;
        match std::fs::metadata(&base) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(base_path = %base.display(), "base path does not exist, creating it");
                std::fs::create_dir_all(&base).map_err(|source| Error::Filesystem {
                    path: base.clone(),
                    source,
                })?;
            }
            Err(source) => return Err(Error::Filesystem { path: base, source }),
        }

        tracing::info!(
            url = %self.config.git_url,
            branch = %self.config.branch,
            "repository not found locally, cloning"
        );
        let args = git::clone_args(
            &self.config.branch,
            &self.config.git_url,
            &self.config.clone_dir_name,
        );
        self.run(cancel, Step::Clone, &base, GIT, &args).await?;

        tracing::info!(path = %working_path.display(), "clone complete");
        self.initialized = true;
        Ok(())
    }

    /// Fetches the tracked branch and reports whether a fast-forward is
    /// available.
    ///
    /// A local branch that has diverged from, or is ahead of, the remote is
    /// reported as `false`: only clean fast-forwards are deployed.
    pub async fn detect_updates(&self, cancel: &CancellationToken) -> Result<bool> {
        let path = self.require_initialized()?;
        let branch = &self.config.branch;

        self.run(cancel, Step::Fetch, path, GIT, &git::fetch_args(branch))
            .await?;

        let local = self
            .run(cancel, Step::ResolveLocal, path, GIT, &git::rev_parse_args("HEAD"))
            .await?
            .stdout
            .trim()
            .to_string();

        let remote_ref = git::remote_ref(branch);
        let remote = self
            .run(cancel, Step::ResolveRemote, path, GIT, &git::rev_parse_args(&remote_ref))
            .await?
            .stdout
            .trim()
            .to_string();

        if local == remote {
            tracing::info!(commit = %local, "no updates, local and remote are at the same commit");
            return Ok(false);
        }

        let args = git::is_ancestor_args(&local, &remote);
        match self.runner.execute(cancel, Some(path), GIT, &args).await {
            Ok(_) => {
                tracing::info!(local = %local, remote = %remote, "updates found");
                Ok(true)
            }
            // Exit 1 means diverged or ahead; leave it for a human.
            Err(RunnerError::Exited { output, .. })
                if Ancestry::from_exit_code(output.exit_code) == Some(Ancestry::NotAncestor) =>
            {
                tracing::info!(
                    local = %local,
                    remote = %remote,
                    "local commit is not an ancestor of remote, skipping automatic pull"
                );
                Ok(false)
            }
            Err(err) => Err(command_error(Step::AncestorCheck, err)),
        }
    }

    /// Fast-forwards the working copy to the remote branch.
    pub async fn pull(&self, cancel: &CancellationToken) -> Result<()> {
        let path = self.require_initialized()?;
        tracing::info!(branch = %self.config.branch, "pulling changes");

        self.run(cancel, Step::Pull, path, GIT, &git::pull_args(&self.config.branch))
            .await?;
        Ok(())
    }

    /// Rebuilds the service image, refreshing base images.
    pub async fn build(&self, cancel: &CancellationToken) -> Result<()> {
        let path = self.require_initialized()?;
        let compose_file = compose::resolve_compose_file(path, &self.config.compose_file);
        tracing::info!(
            service = %self.config.service_name,
            compose_file = %compose_file.display(),
            "building containers"
        );

        let args = compose::build_args(&compose_file, &self.config.service_name);
        self.run(cancel, Step::Build, path, DOCKER, &args).await?;
        Ok(())
    }

    /// Rolls the service: scale up by one, wait [`SETTLE_DELAY`], scale back
    /// to the baseline so the older instance is removed.
    ///
    /// Cancellation during the settle wait returns [`Error::Cancelled`]
    /// without scaling down, leaving both instances running.
    pub async fn deploy(&self, cancel: &CancellationToken) -> Result<()> {
        let path = self.require_initialized()?;
        let compose_file = compose::resolve_compose_file(path, &self.config.compose_file);
        let service = &self.config.service_name;

        tracing::info!(service = %service, instances = self.scale.surge(), "scaling up service");
        let up = self.scale.scale_up_args(&compose_file, service);
        self.run(cancel, Step::ScaleUp, path, DOCKER, &up).await?;

        tracing::info!(duration = ?SETTLE_DELAY, "waiting for new instance to settle");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(
                    service = %service,
                    instances = self.scale.surge(),
                    "cancelled during settle wait, service left over-scaled"
                );
                return Err(Error::Cancelled);
            }
            () = tokio::time::sleep(SETTLE_DELAY) => {}
        }

        // Back to the fixed baseline, not the pre-deploy scale.
        tracing::info!(service = %service, instances = self.scale.baseline, "scaling down service");
        let down = self.scale.scale_down_args(&compose_file, service);
        self.run(cancel, Step::ScaleDown, path, DOCKER, &down).await?;

        tracing::info!(service = %service, "deployment complete");
        Ok(())
    }

    /// Runs one monitoring cycle: initialize, detect, and on a fast-forward
    /// pull, build, and deploy. The first failure ends the cycle.
    pub async fn process_once(&mut self, cancel: &CancellationToken) -> Result<CycleOutcome> {
        let span = tracing::info_span!("cycle", id = %uuid::Uuid::new_v4());
        self.run_cycle(cancel).instrument(span).await
    }

    async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleOutcome> {
        self.ensure_initialized(cancel).await?;
        check_cancelled(cancel)?;

        if !self.detect_updates(cancel).await? {
            return Ok(CycleOutcome::UpToDate);
        }
        check_cancelled(cancel)?;

        tracing::info!("updates detected, starting deployment");
        self.pull(cancel).await?;
        check_cancelled(cancel)?;

        self.build(cancel).await?;
        check_cancelled(cancel)?;

        self.deploy(cancel).await?;
        check_cancelled(cancel)?;

        tracing::info!("repository updated and deployed");
        Ok(CycleOutcome::Deployed)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn command_error(step: Step, err: RunnerError) -> Error {
    if let RunnerError::Cancelled { .. } = err {
        return Error::Cancelled;
    }
    Error::Command(CommandFailure {
        step,
        command: err.command().to_string(),
        exit_code: err.exit_code(),
        stderr: err.stderr().to_string(),
        detail: err.to_string(),
    })
}
