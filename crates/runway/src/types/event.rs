use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Push,
  PullRequest,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::Push => "push",
      EventKind::PullRequest => "pull_request",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl TryFrom<&str> for EventKind {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    match value {
      "push" => Ok(EventKind::Push),
      "pull_request" => Ok(EventKind::PullRequest),
      other => Err(Error::unsupported_feature(format!(
        "Event `{}` is not supported",
        other
      ))),
    }
  }
}

/// Snapshot of the repository event that triggered a run.
///
/// For `push` the ref is the pushed ref. For `pull_request` it is the base
/// branch the PR targets; the source branch goes into `head_ref`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
  pub kind: EventKind,
  /// `refs/heads/main` or plain `main`
  #[serde(rename = "ref")]
  pub ref_name: String,
  #[serde(default)]
  pub head_ref: Option<String>,
  pub sha: String,
  #[serde(default)]
  pub pr_number: Option<u64>,
  #[serde(default)]
  pub repo_owner: String,
  #[serde(default)]
  pub repo_name: String,
}

impl Event {
  pub fn push(ref_name: impl Into<String>, sha: impl Into<String>) -> Self {
    Event {
      kind: EventKind::Push,
      ref_name: ref_name.into(),
      head_ref: None,
      sha: sha.into(),
      pr_number: None,
      repo_owner: String::new(),
      repo_name: String::new(),
    }
  }

  pub fn pull_request(
    pr_number: u64,
    head_ref: impl Into<String>,
    base_ref: impl Into<String>,
    sha: impl Into<String>,
  ) -> Self {
    Event {
      kind: EventKind::PullRequest,
      ref_name: base_ref.into(),
      head_ref: Some(head_ref.into()),
      sha: sha.into(),
      pr_number: Some(pr_number),
      repo_owner: String::new(),
      repo_name: String::new(),
    }
  }

  pub fn repository(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
    self.repo_owner = owner.into();
    self.repo_name = name.into();
    self
  }

  /// Branch name without the `refs/heads/` prefix.
  pub fn branch(&self) -> &str {
    strip_branch_prefix(&self.ref_name)
  }

  /// `owner/name`, or an empty string when the event carries no repository.
  pub fn repository_name(&self) -> String {
    if self.repo_owner.is_empty() && self.repo_name.is_empty() {
      String::new()
    } else {
      format!("{}/{}", self.repo_owner, self.repo_name)
    }
  }

  /// Runs sharing this key supersede each other: a newer push to the same
  /// branch, or a new commit on the same pull request.
  pub fn context_key(&self) -> String {
    match (self.kind, self.pr_number) {
      (EventKind::PullRequest, Some(pr_number)) => format!("pull_request/{}", pr_number),
      (EventKind::PullRequest, None) => format!(
        "pull_request/{}",
        self.head_ref.as_deref().map(strip_branch_prefix).unwrap_or("")
      ),
      (EventKind::Push, _) => format!("push/{}", self.branch()),
    }
  }

  pub fn short_sha(&self) -> &str {
    let end = self
      .sha
      .char_indices()
      .nth(7)
      .map(|(index, _)| index)
      .unwrap_or(self.sha.len());

    &self.sha[..end]
  }

  pub fn validate(&self) -> Result<()> {
    if self.sha.trim().is_empty() {
      return Err(Error::definition_error("Event sha is required"));
    }

    if self.branch().is_empty() {
      return Err(Error::definition_error("Event ref is required"));
    }

    if self.kind == EventKind::PullRequest && self.pr_number.is_none() {
      return Err(Error::definition_error(
        "Pull request events require a pr_number",
      ));
    }

    Ok(())
  }
}

fn strip_branch_prefix(name: &str) -> &str {
  name.strip_prefix("refs/heads/").unwrap_or(name)
}
