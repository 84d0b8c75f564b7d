use crate::{EnvironmentVariable, EnvironmentVariables, Error, Event, Result, Trigger};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// When a step runs, judged against the job so far.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepPredicate {
  /// Only while no earlier step of the job has failed
  #[default]
  OnSuccess,
  /// Also after a failure, for cleanup and reporting
  Always,
}

impl TryFrom<&str> for StepPredicate {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    match value.trim() {
      "always()" | "always" | "${{ always() }}" => Ok(StepPredicate::Always),
      "success()" | "success" | "on_success" | "${{ success() }}" => Ok(StepPredicate::OnSuccess),
      other => Err(Error::definition_error(format!(
        "Unknown `if` predicate `{}`. Use `always()` or `success()`.",
        other
      ))),
    }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
  Read,
  Write,
  None,
}

impl TryFrom<&str> for PermissionMode {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    match value {
      "read" => Ok(PermissionMode::Read),
      "write" => Ok(PermissionMode::Write),
      "none" => Ok(PermissionMode::None),
      other => Err(Error::definition_error(format!(
        "Unknown permission mode `{}`. Use `read`, `write` or `none`.",
        other
      ))),
    }
  }
}

/// Capability scopes a workflow asks for, e.g. `contents: read`.
pub type Permissions = IndexMap<String, PermissionMode>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
  Command {
    run: String,
  },
  Action {
    /// `name` or `name@version`
    uses: String,
    with: IndexMap<String, String>,
  },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepDefinition {
  /// Key later steps use to read this step's outputs
  pub id: Option<String>,
  pub name: Option<String>,
  pub kind: StepKind,
  pub predicate: StepPredicate,
  pub environments: EnvironmentVariables,
  /// Secret names injected as environment variables of the same name
  pub secrets: Vec<String>,
  pub timeout: Option<Duration>,
  pub continue_on_error: bool,
}

impl StepDefinition {
  pub fn command(run: impl Into<String>) -> Self {
    StepDefinition {
      id: None,
      name: None,
      kind: StepKind::Command { run: run.into() },
      predicate: StepPredicate::OnSuccess,
      environments: EnvironmentVariables::new(),
      secrets: vec![],
      timeout: None,
      continue_on_error: false,
    }
  }

  pub fn display_name(&self) -> String {
    if let Some(name) = self.name.as_ref().or(self.id.as_ref()) {
      return name.clone();
    }

    match &self.kind {
      StepKind::Command { run } => run.lines().next().unwrap_or_default().trim().to_string(),
      StepKind::Action { uses, .. } => uses.clone(),
    }
  }

  /// Every string that may hold `${{ ... }}` expressions.
  pub fn expression_sources(&self) -> Vec<&str> {
    let mut sources = vec![];

    match &self.kind {
      StepKind::Command { run } => sources.push(run.as_str()),
      StepKind::Action { with, .. } => sources.extend(with.values().map(|value| value.as_str())),
    }

    sources.extend(self.environments.values().filter_map(|value| match value {
      EnvironmentVariable::String(value) => Some(value.as_str()),
      _ => None,
    }));

    sources
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobDefinition {
  pub name: Option<String>,
  /// Runner profile id
  pub runs_on: String,
  pub needs: Vec<String>,
  pub environments: EnvironmentVariables,
  /// Upper bound on the total step time of the job
  pub timeout: Option<Duration>,
  /// Declaration order is execution order
  pub steps: Vec<StepDefinition>,
}

/// A parsed workflow document. Immutable once loaded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
  pub name: String,
  pub triggers: Vec<Trigger>,
  pub permissions: Permissions,
  pub environments: EnvironmentVariables,
  /// Declaration order
  pub jobs: IndexMap<String, JobDefinition>,
  /// Hex SHA-256 of the document text
  pub source_hash: String,
}

impl WorkflowDefinition {
  /// Parses without checking action names.
  pub fn parse(source: &str) -> Result<Self> {
    super::WorkflowParser::new(source).parse()
  }

  /// Any trigger matches.
  pub fn is_match(&self, event: &Event) -> bool {
    self.triggers.iter().any(|trigger| trigger.is_match(event))
  }

  pub fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
  }
}
