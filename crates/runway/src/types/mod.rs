mod envs;
mod error;
mod event;
mod id;
mod results;
mod workflow_state;
mod workflow_state_event;

pub use envs::*;
pub use error::*;
pub use event::*;
pub use id::*;
pub use results::*;
pub use workflow_state::*;
pub use workflow_state_event::*;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowLogType {
  Error,
  Log,
}

impl std::fmt::Display for WorkflowLogType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkflowLogType::Error => write!(f, "error"),
      WorkflowLogType::Log => write!(f, "log"),
    }
  }
}

/// One captured output line. `Error` lines come from stderr.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Log {
  pub log_type: WorkflowLogType,
  pub message: String,
}

impl Log {
  pub fn log(message: impl Into<String>) -> Self {
    Self {
      log_type: WorkflowLogType::Log,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      log_type: WorkflowLogType::Error,
      message: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.log_type == WorkflowLogType::Error
  }
}

/// A log line as plugins see it, tagged with the step that produced it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowLog {
  pub step_id: StepId,
  pub log_type: WorkflowLogType,
  pub message: String,
  pub time: chrono::DateTime<chrono::Utc>,
}

impl Default for WorkflowLog {
  fn default() -> Self {
    WorkflowLog {
      step_id: StepId::default(),
      log_type: WorkflowLogType::Log,
      message: "".to_string(),
      time: chrono::Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_log() {
    let log = Log::log("test");
    assert_eq!(log.log_type, WorkflowLogType::Log);
    assert_eq!(log.message, "test");
    assert!(!log.is_error());

    let log = Log::error("test");
    assert_eq!(log.log_type, WorkflowLogType::Error);
    assert!(log.is_error());
  }

  #[test]
  fn test_log_type_display() {
    assert_eq!(WorkflowLogType::Error.to_string(), "error");
    assert_eq!(WorkflowLogType::Log.to_string(), "log");
  }
}
