//! Configuration loading and validation.
//!
//! The configuration is one document with a `repositories` list. YAML is the
//! default format; `.toml` and `.json` files are parsed by extension.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Poll interval used when none (or a non-positive one) is configured.
pub const DEFAULT_CHECK_INTERVAL_SECONDS: i64 = 5 * 60;

/// Longest poll interval honored; larger values are clamped to it.
pub const MAX_CHECK_INTERVAL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Compose manifest used when none is configured.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Settings for one watched repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Directory the repository is cloned into.
    #[serde(default)]
    pub base_path: PathBuf,
    /// Remote URL to clone from.
    #[serde(default)]
    pub git_url: String,
    /// Name of the clone directory under `base_path`.
    #[serde(default)]
    pub clone_dir_name: String,
    /// Tracked branch.
    #[serde(default)]
    pub branch: String,
    /// Compose service to build and redeploy.
    #[serde(default)]
    pub service_name: String,
    /// Compose manifest, absolute or relative to the clone.
    #[serde(default)]
    pub compose_file: PathBuf,
    /// Seconds between update checks.
    #[serde(default)]
    pub check_interval_seconds: i64,
}

impl RepositoryConfig {
    /// Returns the poll interval, falling back to the default for
    /// non-positive values and clamping to [`MAX_CHECK_INTERVAL_SECONDS`].
    pub fn check_interval(&self) -> Duration {
        let secs = if self.check_interval_seconds > 0 {
            self.check_interval_seconds.min(MAX_CHECK_INTERVAL_SECONDS)
        } else {
            DEFAULT_CHECK_INTERVAL_SECONDS
        };
        Duration::from_secs(secs.unsigned_abs())
    }

    /// The unresolved clone location, used to identify the repository in logs.
    pub fn display_path(&self) -> PathBuf {
        self.base_path.join(&self.clone_dir_name)
    }

    /// Fills in optional settings that were left unset.
    pub fn apply_defaults(&mut self) {
        if self.compose_file.as_os_str().is_empty() {
            self.compose_file = PathBuf::from(DEFAULT_COMPOSE_FILE);
        }
        if self.check_interval_seconds <= 0 {
            self.check_interval_seconds = DEFAULT_CHECK_INTERVAL_SECONDS;
        }
    }
}

/// The full application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Repositories to watch, in start order.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension; unknown extensions are YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl AppConfig {
    /// Reads, validates, and defaults the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(Error::Config("config file path cannot be empty".to_string()));
        }

        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| {
                    Error::Config(format!(
                        "failed to get absolute path for config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?
                .join(path)
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "config file '{}' not found; create it or pass a valid path with --config",
                    path.display()
                ))
            } else {
                Error::Config(format!(
                    "failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

        Self::parse(&contents, ConfigFormat::from_path(&path)).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parses, validates, and defaults a configuration document.
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        let mut config: AppConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML: {}", e)))?,
            ConfigFormat::Json => serde_json::from_str(contents)
                .map_err(|e| Error::Config(format!("failed to parse JSON: {}", e)))?,
        };

        let warnings = config.validate().into_result()?;
        for warning in &warnings {
            tracing::warn!(warning = %warning, "configuration warning");
        }

        config.apply_defaults();
        Ok(config)
    }

    /// Fills in optional settings on every repository.
    pub fn apply_defaults(&mut self) {
        for repo in &mut self.repositories {
            repo.apply_defaults();
        }
    }
}

/// Default config location: `~/.config/rivet/rivet.yaml`.
///
/// Returns `None` when the home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("rivet").join("rivet.yaml"))
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one, prefixing each issue.
    pub fn merge_with_context(&mut self, context: &str, other: ValidationResult) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{}: {}", context, e)));
        self.warnings
            .extend(other.warnings.into_iter().map(|w| format!("{}: {}", context, w)));
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for RepositoryConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.base_path.as_os_str().is_empty() {
            result.add_error("missing required 'basePath'");
        }
        if self.git_url.trim().is_empty() {
            result.add_error("missing required 'gitUrl'");
        }
        if self.clone_dir_name.trim().is_empty() {
            result.add_error("missing required 'cloneDirName'");
        }
        if self.branch.trim().is_empty() {
            result.add_error("missing required 'branch'");
        }
        if self.service_name.trim().is_empty() {
            result.add_error("missing required 'serviceName'");
        }

        // Zero is what an omitted key deserializes to, so only negative
        // values are worth a warning.
        if self.check_interval_seconds < 0 {
            result.add_warning(format!(
                "checkIntervalSeconds {} is negative, using default of {}",
                self.check_interval_seconds, DEFAULT_CHECK_INTERVAL_SECONDS
            ));
        } else if self.check_interval_seconds > MAX_CHECK_INTERVAL_SECONDS {
            result.add_warning(format!(
                "checkIntervalSeconds {} exceeds the maximum, using {}",
                self.check_interval_seconds, MAX_CHECK_INTERVAL_SECONDS
            ));
        }

        result
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let mut seen: HashMap<PathBuf, usize> = HashMap::new();

        for (index, repo) in self.repositories.iter().enumerate() {
            let context = format!("repository {} ('{}')", index, repo.display_path().display());
            result.merge_with_context(&context, repo.validate());

            if repo.base_path.as_os_str().is_empty() || repo.clone_dir_name.is_empty() {
                continue;
            }
            if let Some(first) = seen.insert(repo.display_path(), index) {
                result.add_warning(format!(
                    "{}: shares its working directory with repository {}",
                    context, first
                ));
            }
        }

        result
    }
}
