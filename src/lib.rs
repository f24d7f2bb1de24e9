//! Rivet - continuous deployment for small fleets of compose services.
//!
//! This library watches git repositories, detects when the tracked branch
//! can be fast-forwarded, and rolls the affected docker compose service with
//! a scale-up / settle / scale-down maneuver.

pub mod config;
pub mod error;
pub mod repository;
pub mod runner;
pub mod watcher;

pub use config::{AppConfig, ConfigFormat, RepositoryConfig, Validate, ValidationResult};
pub use error::{CommandFailure, Error, Result, Step};
pub use repository::{CycleOutcome, RepositoryController};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunnerError};
pub use watcher::Watcher;
