//! Rivet CLI
//!
//! Loads the repository configuration and watches every repository until
//! interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use rivet::config::{self, AppConfig};
use rivet::{ProcessRunner, Watcher};

/// Watches git repositories and redeploys compose services on fast-forward updates.
#[derive(Debug, Parser)]
#[command(name = "rivet", version, about)]
struct Cli {
    /// Path to the configuration file [default: ~/.config/rivet/rivet.yaml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Rewrites single-dash long flags (`-config`, `-version`) to their
/// double-dash form so older invocations keep working.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 {
                return arg;
            }
            let is_single_dash_long = ["-config", "-version"]
                .iter()
                .any(|flag| arg == *flag || arg.starts_with(&format!("{}=", flag)));
            if is_single_dash_long {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for interrupt signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for terminate signal");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "SIGINT", "received signal, shutting down"),
        () = terminate => tracing::info!(signal = "SIGTERM", "received signal, shutting down"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .without_time()
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path().unwrap_or_else(|| {
            let fallback = PathBuf::from("rivet.yaml");
            tracing::warn!(path = %fallback.display(), "could not determine home directory, using fallback config path");
            fallback
        }),
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = %config_path.display(),
        "starting rivet"
    );

    let app_config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if app_config.repositories.is_empty() {
        tracing::info!("no repositories configured, exiting");
        return ExitCode::SUCCESS;
    }
    tracing::info!(
        repositories = app_config.repositories.len(),
        "configuration loaded"
    );

    let watcher = Watcher::new(&app_config, Arc::new(ProcessRunner::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    watcher.run(cancel).await;

    tracing::info!("rivet shut down gracefully");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_dash_long_flags_are_normalized() {
        assert_eq!(
            normalize_args(args(&["rivet", "-config", "/etc/rivet.yaml"])),
            args(&["rivet", "--config", "/etc/rivet.yaml"])
        );
        assert_eq!(
            normalize_args(args(&["rivet", "-config=/etc/rivet.yaml"])),
            args(&["rivet", "--config=/etc/rivet.yaml"])
        );
        assert_eq!(
            normalize_args(args(&["rivet", "-version"])),
            args(&["rivet", "--version"])
        );
    }

    #[test]
    fn other_arguments_are_untouched() {
        let original = args(&["rivet", "--config", "-configs.yaml", "-V"]);
        assert_eq!(normalize_args(original.clone()), original);
    }

    #[test]
    fn cli_accepts_config_path() {
        let cli = Cli::parse_from(normalize_args(args(&["rivet", "-config", "fleet.yaml"])));
        assert_eq!(cli.config, Some(PathBuf::from("fleet.yaml")));
    }

    #[test]
    fn cli_config_is_optional() {
        let cli = Cli::parse_from(args(&["rivet"]));
        assert!(cli.config.is_none());
    }
}
