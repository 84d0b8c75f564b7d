use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
  Pending,
  Queued,
  InProgress,
  Succeeded,
  Failed,
  Cancelled,
  Skipped,
}

impl WorkflowState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      WorkflowState::Succeeded
        | WorkflowState::Failed
        | WorkflowState::Cancelled
        | WorkflowState::Skipped
    )
  }

  pub fn is_in_progress(&self) -> bool {
    matches!(self, WorkflowState::InProgress)
  }

  pub fn is_succeeded(&self) -> bool {
    matches!(self, WorkflowState::Succeeded)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, WorkflowState::Failed)
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, WorkflowState::Cancelled)
  }

  /// Folds job states into a run state: any failure wins, then any
  /// cancellation, otherwise success.
  pub fn aggregate<'a>(states: impl IntoIterator<Item = &'a WorkflowState>) -> WorkflowState {
    let mut cancelled = false;

    for state in states {
      match state {
        WorkflowState::Failed => return WorkflowState::Failed,
        WorkflowState::Cancelled => cancelled = true,
        _ => {}
      }
    }

    if cancelled {
      WorkflowState::Cancelled
    } else {
      WorkflowState::Succeeded
    }
  }
}

impl fmt::Display for WorkflowState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      WorkflowState::Pending => "pending",
      WorkflowState::Queued => "queued",
      WorkflowState::InProgress => "in_progress",
      WorkflowState::Succeeded => "succeeded",
      WorkflowState::Failed => "failed",
      WorkflowState::Cancelled => "cancelled",
      WorkflowState::Skipped => "skipped",
    };

    write!(f, "{}", name)
  }
}
