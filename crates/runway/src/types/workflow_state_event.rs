use crate::{JobId, StepId, WorkflowId, WorkflowState};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStateEvent {
  WorkflowStateUpdated { id: WorkflowId, state: WorkflowState },
  JobStateUpdated { id: JobId, state: WorkflowState },
  StepStateUpdated { id: StepId, state: WorkflowState },
}

impl WorkflowStateEvent {
  pub fn state(&self) -> WorkflowState {
    match self {
      WorkflowStateEvent::WorkflowStateUpdated { state, .. }
      | WorkflowStateEvent::JobStateUpdated { state, .. }
      | WorkflowStateEvent::StepStateUpdated { state, .. } => *state,
    }
  }
}
