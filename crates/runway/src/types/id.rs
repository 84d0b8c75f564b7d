use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Id = String;

/// Identifies one run of a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default)]
pub struct WorkflowId(Id);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default)]
pub struct JobId(Id, Id);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default)]
pub struct StepId(Id, Id, usize);

impl WorkflowId {
  pub fn new(id: impl Into<String>) -> Self {
    WorkflowId(id.into())
  }

  pub fn generate() -> Self {
    WorkflowId(uuid::Uuid::new_v4().to_string())
  }

  pub fn inner(&self) -> &str {
    &self.0
  }
}

impl JobId {
  pub fn new(workflow_id: impl Into<String>, job_key: impl Into<String>) -> Self {
    JobId(workflow_id.into(), job_key.into())
  }

  pub fn workflow_id(&self) -> WorkflowId {
    WorkflowId(self.0.clone())
  }

  pub fn job_key(&self) -> &str {
    &self.1
  }

  pub fn step(&self, index: usize) -> StepId {
    StepId(self.0.clone(), self.1.clone(), index)
  }
}

impl StepId {
  pub fn new(workflow_id: impl Into<String>, job_key: impl Into<String>, index: usize) -> Self {
    StepId(workflow_id.into(), job_key.into(), index)
  }

  pub fn workflow_id(&self) -> WorkflowId {
    WorkflowId(self.0.clone())
  }

  pub fn job_id(&self) -> JobId {
    JobId(self.0.clone(), self.1.clone())
  }

  pub fn job_key(&self) -> &str {
    &self.1
  }

  pub fn index(&self) -> usize {
    self.2
  }
}

impl fmt::Display for WorkflowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.0, self.1)
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.0, self.1, self.2)
  }
}

impl TryFrom<&str> for WorkflowId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    if value.is_empty() || value.contains('/') {
      Err(Error::internal_runtime_error(
        "WorkflowId cannot be empty or contain `/`",
      ))
    } else {
      Ok(WorkflowId(value.to_string()))
    }
  }
}

impl TryFrom<&str> for JobId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.split('/').collect::<Vec<_>>()[..] {
      [workflow_id, job_key] if !workflow_id.is_empty() && !job_key.is_empty() => {
        Ok(JobId(workflow_id.to_string(), job_key.to_string()))
      }
      _ => Err(Error::internal_runtime_error(
        "JobId must be in the format of <workflow_id>/<job_key>",
      )),
    }
  }
}

impl TryFrom<&str> for StepId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.split('/').collect::<Vec<_>>()[..] {
      [workflow_id, job_key, index] if !workflow_id.is_empty() && !job_key.is_empty() => {
        let index = index
          .parse::<usize>()
          .map_err(|_| Error::internal_runtime_error("Step index must be a number"))?;

        Ok(StepId(workflow_id.to_string(), job_key.to_string(), index))
      }
      _ => Err(Error::internal_runtime_error(
        "StepId must be in the format of <workflow_id>/<job_key>/<index>",
      )),
    }
  }
}
