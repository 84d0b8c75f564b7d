use crate::{Error, Event, EventKind, Result, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry under `on:`. `branches: None` accepts any branch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Trigger {
  pub kind: EventKind,
  pub branches: Option<Vec<String>>,
}

impl Trigger {
  pub fn new(kind: EventKind) -> Self {
    Trigger {
      kind,
      branches: None,
    }
  }

  pub fn branches(mut self, branches: Vec<String>) -> Self {
    self.branches = Some(branches);
    self
  }

  /// Rejects branch patterns `glob` cannot compile.
  pub fn validate(&self) -> Result<()> {
    for pattern in self.branches.iter().flatten() {
      glob::Pattern::new(pattern).map_err(|err| {
        Error::definition_error(format!(
          "Invalid branch pattern `{}` in `on.{}`: {}",
          pattern, self.kind, err
        ))
      })?;
    }

    Ok(())
  }

  /// Same event kind, and the event's branch satisfies the filter. For pull
  /// requests the filter applies to the base branch.
  pub fn is_match(&self, event: &Event) -> bool {
    if self.kind != event.kind {
      return false;
    }

    match &self.branches {
      Some(branches) => is_match_patterns(event.branch(), branches),
      None => true,
    }
  }
}

fn is_match_patterns(value: &str, patterns: &[String]) -> bool {
  for pattern in patterns {
    if pattern == value {
      return true;
    }

    match glob::Pattern::new(pattern) {
      Ok(pattern) => {
        if pattern.matches(value) {
          return true;
        }
      }
      Err(err) => {
        log::error!("Invalid glob pattern `{}`: {}", pattern, err);
      }
    }
  }

  false
}

/// Workflows with at least one trigger accepting `event`, in input order.
/// No match is an empty list.
pub fn match_workflows<'a>(
  event: &Event,
  workflows: impl IntoIterator<Item = &'a Arc<WorkflowDefinition>>,
) -> Vec<Arc<WorkflowDefinition>> {
  workflows
    .into_iter()
    .filter(|workflow| workflow.is_match(event))
    .cloned()
    .collect()
}
