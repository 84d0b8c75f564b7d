use crate::{Error, Event, JobId, Log, StepId, WorkflowId, WorkflowState};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

pub type Time = chrono::DateTime<chrono::Utc>;

/// Output key every executed step exposes.
pub const EXIT_CODE_OUTPUT: &str = "exit_code";
/// Output key the build action and the reporter use for image artifacts.
pub const IMAGE_DIGEST_OUTPUT: &str = "image_digest";

/// Why a step ended up `Failed`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StepFailure {
  ExitCode { code: i32 },
  Timeout { after: String },
  SecretNotFound { name: String },
  UnresolvedOutput { reference: String },
  Internal { message: String },
}

impl StepFailure {
  pub fn reason_code(&self) -> &'static str {
    match self {
      StepFailure::ExitCode { .. } => "exit_code",
      StepFailure::Timeout { .. } => "timeout",
      StepFailure::SecretNotFound { .. } => "secret_not_found",
      StepFailure::UnresolvedOutput { .. } => "unresolved_output",
      StepFailure::Internal { .. } => "internal",
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, StepFailure::Timeout { .. })
  }
}

impl From<Error> for StepFailure {
  fn from(err: Error) -> Self {
    match err {
      Error::SecretNotFound(name) => StepFailure::SecretNotFound { name },
      Error::UnresolvedOutput(reference) => StepFailure::UnresolvedOutput { reference },
      Error::Timeout(after) => StepFailure::Timeout { after },
      other => StepFailure::Internal {
        message: other.to_string(),
      },
    }
  }
}

impl fmt::Display for StepFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepFailure::ExitCode { code } => write!(f, "exited with code {}", code),
      StepFailure::Timeout { after } => write!(f, "timed out after {}", after),
      StepFailure::SecretNotFound { name } => write!(f, "secret `{}` not found", name),
      StepFailure::UnresolvedOutput { reference } => {
        write!(f, "unresolved output reference `{}`", reference)
      }
      StepFailure::Internal { message } => write!(f, "{}", message),
    }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepRunResult {
  pub id: StepId,
  pub name: Option<String>,
  pub state: WorkflowState,
  pub exit_code: Option<i32>,
  pub failure: Option<StepFailure>,
  /// Combined stdout/stderr in arrival order, secrets masked
  pub logs: Vec<Log>,
  /// Set when `logs` hit the capture cap
  pub truncated: bool,
  pub outputs: HashMap<String, String>,
  pub started_at: Option<Time>,
  pub completed_at: Option<Time>,
}

impl StepRunResult {
  fn unexecuted(id: StepId, name: Option<String>, state: WorkflowState) -> Self {
    StepRunResult {
      id,
      name,
      state,
      exit_code: None,
      failure: None,
      logs: vec![],
      truncated: false,
      outputs: HashMap::new(),
      started_at: None,
      completed_at: None,
    }
  }

  pub fn skipped(id: StepId, name: Option<String>) -> Self {
    Self::unexecuted(id, name, WorkflowState::Skipped)
  }

  pub fn cancelled(id: StepId, name: Option<String>) -> Self {
    Self::unexecuted(id, name, WorkflowState::Cancelled)
  }

  pub fn display_name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| format!("Step {}", self.id.index() + 1))
  }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobRunResult {
  pub id: JobId,
  pub name: Option<String>,
  pub state: WorkflowState,
  /// Declaration order, one entry per step
  pub steps: Vec<StepRunResult>,
  /// Index of the step that failed the job
  pub failed_step: Option<usize>,
  /// Set when the job failed before any step ran, e.g. a failed checkout
  #[serde(default)]
  pub error: Option<String>,
  pub started_at: Option<Time>,
  pub completed_at: Option<Time>,
}

impl JobRunResult {
  /// A job that never ran, e.g. because a job it needs failed.
  pub fn cancelled(id: JobId, name: Option<String>) -> Self {
    let now = chrono::Utc::now();

    JobRunResult {
      id,
      name,
      state: WorkflowState::Cancelled,
      steps: vec![],
      failed_step: None,
      error: None,
      started_at: None,
      completed_at: Some(now),
    }
  }

  /// A job that could not start its steps.
  pub fn failed(id: JobId, name: Option<String>, error: impl Into<String>) -> Self {
    let now = chrono::Utc::now();

    JobRunResult {
      id,
      name,
      state: WorkflowState::Failed,
      steps: vec![],
      failed_step: None,
      error: Some(error.into()),
      started_at: Some(now),
      completed_at: Some(now),
    }
  }

  pub fn display_name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| self.id.job_key().to_string())
  }
}

/// Finished run of one workflow for one event.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowRunResult {
  pub id: WorkflowId,
  pub workflow: String,
  pub source_hash: String,
  pub event: Event,
  pub state: WorkflowState,
  /// Declaration order
  pub jobs: IndexMap<String, JobRunResult>,
  pub created_at: Time,
  pub completed_at: Option<Time>,
}

impl WorkflowRunResult {
  /// Last `image_digest` output produced anywhere in the run.
  pub fn image_digest(&self) -> Option<&str> {
    self
      .jobs
      .values()
      .flat_map(|job| job.steps.iter())
      .filter_map(|step| step.outputs.get(IMAGE_DIGEST_OUTPUT))
      .last()
      .map(|digest| digest.as_str())
  }

  pub fn step_count(&self) -> usize {
    self.jobs.values().map(|job| job.steps.len()).sum()
  }
}
