//! Docker compose command lines for building and rolling a service.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// The docker executable; compose runs as `docker compose`.
pub const DOCKER: &str = "docker";

/// Wait between starting the new instance and removing the old one.
pub const SETTLE_DELAY: Duration = Duration::from_secs(30);

/// Resolves the compose manifest: absolute paths are used as-is, relative
/// ones are joined onto the working copy.
pub fn resolve_compose_file(working_path: &Path, compose_file: &Path) -> PathBuf {
    if compose_file.is_absolute() {
        compose_file.to_path_buf()
    } else {
        working_path.join(compose_file)
    }
}

fn base_args(compose_file: &Path) -> Vec<String> {
    vec![
        "compose".to_string(),
        "-f".to_string(),
        compose_file.to_string_lossy().into_owned(),
    ]
}

/// `compose -f <file> build --pull [service]`
pub fn build_args(compose_file: &Path, service: &str) -> Vec<String> {
    let mut args = base_args(compose_file);
    args.push("build".to_string());
    args.push("--pull".to_string());
    if !service.is_empty() {
        args.push(service.to_string());
    }
    args
}

/// Instance counts for the scale-up / settle / scale-down roll.
///
/// The baseline is fixed at one instance; the service's current scale is
/// never inspected, so services running more than one replica are scaled
/// back to one by a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePlan {
    pub baseline: u32,
}

impl ScalePlan {
    /// The assumed steady-state instance count.
    pub const BASELINE: u32 = 1;

    /// Instance count while old and new instances overlap.
    pub fn surge(&self) -> u32 {
        self.baseline + 1
    }

    /// `compose -f <file> up -d --no-deps --scale <svc>=<surge> --no-recreate <svc>`
    pub fn scale_up_args(&self, compose_file: &Path, service: &str) -> Vec<String> {
        let mut args = base_args(compose_file);
        args.extend([
            "up".to_string(),
            "-d".to_string(),
            "--no-deps".to_string(),
            "--scale".to_string(),
            format!("{}={}", service, self.surge()),
            "--no-recreate".to_string(),
            service.to_string(),
        ]);
        args
    }

    /// `compose -f <file> up -d --scale <svc>=<baseline> --no-recreate <svc>`
    pub fn scale_down_args(&self, compose_file: &Path, service: &str) -> Vec<String> {
        let mut args = base_args(compose_file);
        args.extend([
            "up".to_string(),
            "-d".to_string(),
            "--scale".to_string(),
            format!("{}={}", service, self.baseline),
            "--no-recreate".to_string(),
            service.to_string(),
        ]);
        args
    }
}

impl Default for ScalePlan {
    fn default() -> Self {
        Self {
            baseline: Self::BASELINE,
        }
    }
}
