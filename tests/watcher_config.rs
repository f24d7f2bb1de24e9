//! Integration tests wiring configuration files into the watcher.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rivet::runner::{Reply, ScriptedRunner};
use rivet::{AppConfig, Watcher};

#[tokio::test]
async fn empty_repository_list_loads_and_watches_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rivet.yaml");
    std::fs::write(&path, "repositories: []\n").unwrap();

    let config = AppConfig::load(&path).unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let watcher = Watcher::new(&config, Arc::clone(&runner));

    assert!(watcher.is_empty());
    watcher.run(CancellationToken::new()).await;
    assert!(runner.invocations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn loaded_repositories_are_cloned_and_checked() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("apps");
    let path = dir.path().join("rivet.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[[repositories]]
basePath = "{}"
gitUrl = "https://example.com/acme/web.git"
cloneDirName = "web"
branch = "main"
serviceName = "web"
checkIntervalSeconds = 60
"#,
            base.display()
        ),
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    let runner = Arc::new(ScriptedRunner::new().on("git rev-parse", Reply::stdout("abc123\n")));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        trigger.cancel();
    });

    Watcher::new(&config, Arc::clone(&runner)).run(cancel).await;

    // The scripted clone never creates `.git`, but the controller stays
    // initialized, so only the first cycle clones.
    assert_eq!(runner.count("git clone"), 1);
    assert_eq!(runner.count_in(&base, "git clone"), 1);
    assert_eq!(runner.count("git fetch"), 2);
    assert_eq!(runner.count("docker"), 0);
}
