use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
  path::{Path, PathBuf},
  time::Duration,
};

/// Engine-wide settings. Every field has a default, so a config file only
/// lists what it changes:
///
/// ```yaml
/// working-directory: /var/lib/runway
/// default-step-timeout: 30m
/// deploy-branch: release
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
  /// Root for per-run job workspaces
  pub working_directory: PathBuf,
  #[serde(with = "duration_format")]
  pub default_step_timeout: Duration,
  /// Upper bound on the sum of step durations within one job
  #[serde(with = "duration_format")]
  pub default_job_timeout: Duration,
  /// How long a step may take to stop after a cancel or timeout signal
  #[serde(with = "duration_format")]
  pub cancel_grace_period: Duration,
  /// Captured output per step. The rest is replaced by a truncation marker.
  pub max_log_bytes: usize,
  pub max_comment_bytes: usize,
  /// Lines of log shown per failed step in PR comments
  pub log_excerpt_lines: usize,
  /// Successful pushes to this branch publish an image
  pub deploy_branch: String,
  pub max_parallel_jobs: usize,
  pub keep_workspaces: bool,
  /// Build context used when a run produced no image digest itself
  pub build_context: PathBuf,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      working_directory: std::env::temp_dir().join("runway"),
      default_step_timeout: Duration::from_secs(60 * 60),
      default_job_timeout: Duration::from_secs(6 * 60 * 60),
      cancel_grace_period: Duration::from_secs(10),
      max_log_bytes: 1024 * 1024,
      max_comment_bytes: 60_000,
      log_excerpt_lines: 50,
      deploy_branch: "main".to_string(),
      max_parallel_jobs: 4,
      keep_workspaces: false,
      build_context: PathBuf::from("."),
    }
  }
}

impl EngineConfig {
  pub fn from_yaml(content: &str) -> Result<Self> {
    let config: EngineConfig = serde_yaml::from_str(content)
      .map_err(|err| Error::init_error(format!("Failed to parse config: {}", err)))?;

    config.validate()?;

    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|err| {
      Error::init_error(format!(
        "Failed to read config {}: {}",
        path.display(),
        err
      ))
    })?;

    Self::from_yaml(&content)
  }

  pub fn validate(&self) -> Result<()> {
    if self.max_parallel_jobs == 0 {
      return Err(Error::init_error("max-parallel-jobs must be at least 1"));
    }

    if self.default_step_timeout.is_zero() || self.default_job_timeout.is_zero() {
      return Err(Error::init_error("Timeouts must be greater than zero"));
    }

    if self.deploy_branch.trim().is_empty() {
      return Err(Error::init_error("deploy-branch cannot be empty"));
    }

    Ok(())
  }
}

/// Parses durations such as `90s`, `10m` or `1h 30m`.
pub fn parse_duration(value: &str) -> Result<Duration> {
  humantime::parse_duration(value).map_err(|err| {
    log::error!("Invalid duration `{}`: {}", value, err);
    Error::definition_error(format!(
      "Invalid timeout format `{}`. The format should be like `60m` or `1h`.",
      value
    ))
  })
}

mod duration_format {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value).map_err(serde::de::Error::custom)
  }
}
