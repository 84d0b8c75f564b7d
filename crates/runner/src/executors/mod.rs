mod docker;
mod host;

pub use docker::DockerExecutor;
pub use host::HostExecutor;

use crate::command::{ExitStatus, Receiver};
use runway::{Context, Result, Signal, StreamSender, WorkflowLogType};
use tokio_stream::StreamExt;

/// Exit code reported for processes killed without one.
pub const KILLED_EXIT_CODE: i32 = 137;

#[runway::async_trait]
pub trait Executor: Send + Sync {
  /// Runs one shell step and ends `sender` with its result.
  async fn execute(&self, ctx: Context, sender: StreamSender) -> Result<()>;
}

/// Copies process output into the step stream and ends it with the exit
/// status.
pub(crate) async fn forward(mut receiver: Receiver, sender: &StreamSender) -> ExitStatus {
  while let Some(log) = receiver.next().await {
    match log.log_type {
      WorkflowLogType::Log => sender.log(log.message),
      WorkflowLogType::Error => sender.error(log.message),
    }
  }

  let exit_status = receiver.exit_status().unwrap_or(ExitStatus::Killed);

  match exit_status {
    ExitStatus::Exited(0) => sender.succeeded(),
    ExitStatus::Exited(code) => sender.failed(code),
    ExitStatus::Interrupted(Signal::Cancel) => sender.cancelled(),
    ExitStatus::Interrupted(Signal::Timeout) => sender.timeout(),
    ExitStatus::Killed => sender.failed(KILLED_EXIT_CODE),
  }

  exit_status
}

/// Ends the stream without running anything when the step was stopped
/// before it started.
pub(crate) fn already_stopped(ctx: &Context, sender: &StreamSender) -> bool {
  match ctx.signal.signal() {
    Some(Signal::Cancel) => sender.cancelled(),
    Some(Signal::Timeout) => sender.timeout(),
    None => return false,
  }

  log::trace!("Step {} was stopped before it started", ctx.command.id);
  true
}
