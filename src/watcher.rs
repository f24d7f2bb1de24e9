//! Watcher that monitors every configured repository concurrently.
//!
//! Each repository gets exactly one monitoring task for the life of the
//! process. A failing or slow repository never delays the others, and every
//! task stops once the shared cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::error::Error;
use crate::repository::{CycleOutcome, RepositoryController};
use crate::runner::CommandRunner;

/// Owns the repository controllers and runs their monitoring loops.
pub struct Watcher<R: CommandRunner> {
    repositories: Vec<RepositoryController<R>>,
}

impl<R: CommandRunner + 'static> Watcher<R> {
    /// Creates one controller per configured repository, in config order.
    pub fn new(config: &AppConfig, runner: Arc<R>) -> Self {
        let repositories = config
            .repositories
            .iter()
            .cloned()
            .map(|repo| RepositoryController::new(repo, Arc::clone(&runner)))
            .collect();
        Self { repositories }
    }

    /// Number of watched repositories.
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Returns true if no repositories are configured.
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Monitors every repository until `cancel` fires and all monitors exit.
    ///
    /// Consumes the watcher: each controller moves into its own task, so no
    /// controller is ever driven by two tasks.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(repositories = self.len(), "watcher started");

        let mut monitors = JoinSet::new();
        for controller in self.repositories {
            let config = controller.config();
            let span = tracing::info_span!(
                "repository",
                path = %config.display_path().display(),
                branch = %config.branch,
            );
            let interval = config.check_interval();
            monitors.spawn(monitor(controller, interval, cancel.clone()).instrument(span));
        }

        while let Some(result) = monitors.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "repository monitor terminated abnormally");
            }
        }

        tracing::info!("watcher stopped, all repository monitors shut down");
    }
}

/// Runs a cycle immediately, then once per `interval` until cancelled.
async fn monitor<R: CommandRunner>(
    mut controller: RepositoryController<R>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "starting monitoring");

    run_cycle(&mut controller, &cancel).await;
    if cancel.is_cancelled() {
        tracing::info!("monitoring stopped during initial check");
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("monitoring stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        tracing::debug!("scheduled check triggered");
        run_cycle(&mut controller, &cancel).await;
        if cancel.is_cancelled() {
            tracing::info!("monitoring stopped during scheduled check");
            return;
        }
    }
}

/// Runs one cycle and logs its outcome. Failures never escape.
async fn run_cycle<R: CommandRunner>(
    controller: &mut RepositoryController<R>,
    cancel: &CancellationToken,
) {
    match controller.process_once(cancel).await {
        Ok(CycleOutcome::UpToDate) => tracing::debug!("nothing to deploy"),
        Ok(CycleOutcome::Deployed) => tracing::info!("update deployed"),
        Err(Error::Cancelled) => tracing::info!("cycle cancelled"),
        Err(err) => match err.command_failure() {
            Some(failure) if err.is_critical() => tracing::error!(
                step = %failure.step,
                command = %failure.command,
                exit_code = failure.exit_code,
                stderr = %failure.stderr.trim(),
                "scale down failed, service may be left over-scaled"
            ),
            Some(failure) => tracing::error!(
                step = %failure.step,
                command = %failure.command,
                exit_code = failure.exit_code,
                stderr = %failure.stderr.trim(),
                "cycle failed"
            ),
            None => tracing::error!(error = %err, "cycle failed"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepositoryConfig, MAX_CHECK_INTERVAL_SECONDS};
    use crate::runner::{Reply, ScriptedRunner};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn repo(base: &Path, name: &str, interval_secs: i64) -> RepositoryConfig {
        std::fs::create_dir_all(base.join(name).join(".git")).unwrap();
        RepositoryConfig {
            base_path: base.to_path_buf(),
            git_url: format!("https://example.com/acme/{}.git", name),
            clone_dir_name: name.to_string(),
            branch: "main".to_string(),
            service_name: name.to_string(),
            compose_file: PathBuf::from("docker-compose.yml"),
            check_interval_seconds: interval_secs,
        }
    }

    fn cancel_after(cancel: &CancellationToken, secs: u64) {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            trigger.cancel();
        });
    }

    #[tokio::test]
    async fn watcher_builds_one_controller_per_repository() {
        let base = TempDir::new().unwrap();
        let config = AppConfig {
            repositories: vec![repo(base.path(), "a", 60), repo(base.path(), "b", 60)],
        };

        let watcher = Watcher::new(&config, Arc::new(ScriptedRunner::new()));

        assert_eq!(watcher.len(), 2);
        assert!(!watcher.is_empty());
    }

    #[tokio::test]
    async fn empty_watcher_returns_immediately() {
        let watcher = Watcher::new(&AppConfig::default(), Arc::new(ScriptedRunner::new()));
        assert!(watcher.is_empty());

        watcher.run(CancellationToken::new()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately_and_run_returns_on_cancel() {
        let base = TempDir::new().unwrap();
        let config = AppConfig {
            repositories: vec![repo(base.path(), "a", 300), repo(base.path(), "b", 300)],
        };
        let runner = Arc::new(ScriptedRunner::new().on("git rev-parse", Reply::stdout("abc123\n")));
        let cancel = CancellationToken::new();
        cancel_after(&cancel, 1);

        Watcher::new(&config, Arc::clone(&runner)).run(cancel).await;

        assert_eq!(runner.count_in(&base.path().join("a"), "git fetch"), 1);
        assert_eq!(runner.count_in(&base.path().join("b"), "git fetch"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_repository_does_not_affect_others() {
        let base = TempDir::new().unwrap();
        let a = base.path().join("a");
        let b = base.path().join("b");
        let config = AppConfig {
            repositories: vec![repo(base.path(), "a", 60), repo(base.path(), "b", 60)],
        };
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_in(&a, "git fetch", Reply::exit(128, "could not read from remote"))
                .on("git rev-parse", Reply::stdout("abc123\n")),
        );
        let cancel = CancellationToken::new();
        cancel_after(&cancel, 250);

        Watcher::new(&config, Arc::clone(&runner)).run(cancel).await;

        // Cycles at 0, 60, 120, 180 and 240 seconds for both repositories.
        assert_eq!(runner.count_in(&a, "git fetch"), 5);
        assert_eq!(runner.count_in(&b, "git fetch"), 5);
        assert_eq!(runner.count_in(&a, "git rev-parse"), 0);
        assert_eq!(runner.count_in(&b, "git rev-parse"), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_repository_does_not_delay_others() {
        let base = TempDir::new().unwrap();
        let a = base.path().join("a");
        let b = base.path().join("b");
        let config = AppConfig {
            repositories: vec![repo(base.path(), "a", 60), repo(base.path(), "b", 60)],
        };
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_in(&a, "git fetch", Reply::Hang)
                .on("git rev-parse", Reply::stdout("abc123\n")),
        );
        let cancel = CancellationToken::new();
        cancel_after(&cancel, 130);

        Watcher::new(&config, Arc::clone(&runner)).run(cancel).await;

        assert_eq!(runner.count_in(&a, "git fetch"), 1);
        assert_eq!(runner.count_in(&b, "git fetch"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_keeps_monitor_alive() {
        let base = TempDir::new().unwrap();
        let config = AppConfig {
            repositories: vec![repo(base.path(), "a", i64::MAX)],
        };
        let runner = Arc::new(ScriptedRunner::new().on("git rev-parse", Reply::stdout("abc123\n")));
        let cancel = CancellationToken::new();
        cancel_after(&cancel, MAX_CHECK_INTERVAL_SECONDS.unsigned_abs() + 10);

        Watcher::new(&config, Arc::clone(&runner)).run(cancel).await;

        // The clamped interval still schedules a second cycle.
        assert_eq!(runner.count("git fetch"), 2);
    }
}
