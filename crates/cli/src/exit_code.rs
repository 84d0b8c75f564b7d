use runway::RunVerdict;

/// Process exit codes of `runway run-workflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitCode {
  /// Every matched workflow succeeded, or nothing matched
  Success = 0,
  Failure = 1,
  Cancelled = 2,
  /// The definition or the event could not be loaded
  Malformed = 3,
  PublishFailed = 4,
  Other = 5,
}

impl ExitCode {
  pub fn code(self) -> i32 {
    self as i32
  }

  /// Exit code for an error that stopped the command before any run
  /// finished.
  pub fn for_error(err: &anyhow::Error) -> Self {
    match err.downcast_ref::<runway::Error>() {
      Some(runway::Error::DefinitionError(_)) => ExitCode::Malformed,
      _ => ExitCode::Other,
    }
  }

  /// Folds the verdicts of several runs. Cancelled wins over failed, which
  /// wins over a failed publish.
  pub fn for_verdicts(verdicts: impl IntoIterator<Item = RunVerdict>) -> Self {
    verdicts
      .into_iter()
      .map(ExitCode::from)
      .max_by_key(|code| match code {
        ExitCode::Cancelled => 3,
        ExitCode::Failure => 2,
        ExitCode::PublishFailed => 1,
        _ => 0,
      })
      .unwrap_or(ExitCode::Success)
  }
}

impl From<RunVerdict> for ExitCode {
  fn from(verdict: RunVerdict) -> Self {
    match verdict {
      RunVerdict::Passed => ExitCode::Success,
      RunVerdict::PassedPublishFailed => ExitCode::PublishFailed,
      RunVerdict::Failed => ExitCode::Failure,
      RunVerdict::Cancelled => ExitCode::Cancelled,
    }
  }
}
