use crate::{EnvironmentVariables, Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct UserTriggerFilter {
  pub branches: Option<Vec<String>>,
  pub paths: Option<Vec<String>>,
}

/// `on:` as written: one event, a list of events, or a map of filters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserTriggers {
  Event(String),
  Events(Vec<String>),
  Config(IndexMap<String, Option<UserTriggerFilter>>),
}

/// `needs:` takes one job key or a list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserNeeds {
  Job(String),
  Jobs(Vec<String>),
}

impl UserNeeds {
  pub fn into_vec(self) -> Vec<String> {
    match self {
      UserNeeds::Job(job) => vec![job],
      UserNeeds::Jobs(jobs) => jobs,
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct UserStep {
  pub id: Option<String>,
  pub name: Option<String>,
  pub run: Option<String>,
  pub uses: Option<String>,
  pub with: Option<IndexMap<String, serde_yaml::Value>>,
  #[serde(rename = "if")]
  pub condition: Option<String>,
  pub env: Option<EnvironmentVariables>,
  pub secrets: Option<Vec<String>>,
  pub timeout: Option<String>,
  pub continue_on_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct UserJob {
  pub name: Option<String>,
  pub runs_on: Option<String>,
  pub needs: Option<UserNeeds>,
  pub env: Option<EnvironmentVariables>,
  pub timeout: Option<String>,
  pub steps: Option<Vec<UserStep>>,
}

/// The workflow document exactly as deserialized, before validation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UserWorkflow {
  pub name: Option<String>,
  pub on: Option<UserTriggers>,
  pub permissions: Option<IndexMap<String, String>>,
  pub env: Option<EnvironmentVariables>,
  pub jobs: Option<IndexMap<String, UserJob>>,
}

impl TryFrom<&str> for UserWorkflow {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    let workflow: Option<UserWorkflow> = serde_yaml::from_str(value)
      .map_err(|e| Error::definition_error(format!("Failed to parse workflow: {}", e)))?;

    workflow.ok_or_else(|| Error::definition_error("Workflow document is empty"))
  }
}

impl TryFrom<String> for UserWorkflow {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> {
    Self::try_from(value.as_str())
  }
}
