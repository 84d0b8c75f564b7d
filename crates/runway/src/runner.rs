use crate::{stream::StreamReceiver, Event, RunSignal, StepId, Workspace};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
pub use tokio_stream::{Stream, StreamExt};

/// Runner profile used when a job does not set `runs-on`.
pub const DEFAULT_RUNS_ON: &str = "host";
/// Environment variable naming the file a step may write `key=value` outputs to.
pub const OUTPUT_FILE_ENV: &str = "RUNWAY_OUTPUT";
/// Environment variable naming the job workspace.
pub const WORKSPACE_ENV: &str = "RUNWAY_WORKSPACE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunResult {
  Succeeded,
  Failed { exit_code: i32 },
  TimedOut,
  Cancelled,
}

/// A shell step, fully resolved: expressions are interpolated and the
/// environment holds everything the process should see.
#[derive(Debug, Clone, Default)]
pub struct Command {
  pub id: StepId,
  pub name: Option<String>,
  pub run: String,
  /// Runner profile id from `runs-on`
  pub runs_on: String,
  pub environments: HashMap<String, String>,
  pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Context {
  pub id: String,
  pub signal: RunSignal,
  pub command: Command,
  pub event: Event,
  pub workspace: Workspace,
}

pub type RunResponse = crate::Result<StreamReceiver>;

/// # Runner
/// Executes shell steps. The engine calls `run` once per step and drains
/// the returned stream until the runner ends it.
///
/// Return quickly from `run` and do the work in a spawned task. Watch
/// `ctx.signal`: on cancel end the stream with `cancelled()`, on timeout
/// with `timeout()`. Runners that ignore the signal are finalized by the
/// engine after the grace period.
///
/// ```rust
/// struct Runner;
///
/// #[runway::async_trait]
/// impl runway::Runner for Runner {
///   async fn run(&self, ctx: runway::Context) -> runway::RunResponse {
///     let (tx, rx) = runway::stream();
///
///     tokio::task::spawn(async move {
///       tx.log(ctx.command.run);
///       tx.end(runway::RunResult::Succeeded);
///     });
///
///     Ok(rx)
///   }
/// }
/// ```
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
  async fn run(&self, ctx: Context) -> RunResponse;
}
