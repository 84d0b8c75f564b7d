use crate::{
  executors::Executor,
  profiles::{Profile, RunnerProfiles},
};
use runway::{stream, Context, RunResponse, RunResult, Runner};
use std::sync::Arc;

/// Runs shell steps on this machine, either directly or in docker,
/// depending on the job's `runs-on`.
#[derive(Clone)]
pub struct RunwayRunner {
  profiles: Arc<RunnerProfiles>,
}

impl RunwayRunner {
  pub fn builder() -> RunwayRunnerBuilder {
    RunwayRunnerBuilder::new()
  }

  pub fn profile(&self, runs_on: &str) -> Profile {
    self.profiles.resolve(runs_on)
  }

  fn create_executor(&self, ctx: &Context) -> Arc<dyn Executor> {
    let profile = self.profile(&ctx.command.runs_on);
    log::trace!(
      "Step {} runs on `{}` with {:?}",
      ctx.command.id,
      ctx.command.runs_on,
      profile
    );

    profile.executor()
  }
}

#[runway::async_trait]
impl Runner for RunwayRunner {
  async fn run(&self, ctx: Context) -> RunResponse {
    let (sender, receiver) = stream();

    let executor = self.create_executor(&ctx);

    tokio::spawn(async move {
      let id = ctx.command.id.clone();

      if let Err(err) = executor.execute(ctx, sender.clone()).await {
        log::error!("RunwayRunner: step {} failed to execute: {}", id, err);
        sender.error(err.to_string());
      }

      if !sender.is_ended() {
        sender.end(RunResult::Failed { exit_code: 1 });
      }
    });

    Ok(receiver)
  }
}

pub struct RunwayRunnerBuilder {
  profiles: RunnerProfiles,
}

impl RunwayRunnerBuilder {
  pub fn new() -> Self {
    Self {
      profiles: RunnerProfiles::new(),
    }
  }

  pub fn profiles(mut self, profiles: RunnerProfiles) -> Self {
    self.profiles = profiles;
    self
  }

  pub fn profile(mut self, runs_on: impl Into<String>, profile: Profile) -> Self {
    self.profiles.insert(runs_on, profile);
    self
  }

  pub fn build(self) -> RunwayRunner {
    RunwayRunner {
      profiles: Arc::new(self.profiles),
    }
  }
}

impl Default for RunwayRunnerBuilder {
  fn default() -> Self {
    Self::new()
  }
}
