use super::{JobDefinition, StepPredicate};
use crate::{
  merge_environments, EnvironmentVariables, Error, Event, ExecutionContext, JobId, JobOutputs,
  JobRunResult, Log, RunJobEvent, RunSignal, StepRun, StepRunResult, WorkflowState,
  WorkflowStateEvent, Workspace,
};
use std::time::Instant;

/// One job of a run: its definition plus the workflow level `env`.
#[derive(Debug, Clone)]
pub struct Job {
  pub id: JobId,
  pub definition: JobDefinition,
  pub environments: EnvironmentVariables,
}

impl Job {
  pub fn new(id: JobId, definition: JobDefinition, environments: EnvironmentVariables) -> Self {
    Job {
      id,
      definition,
      environments,
    }
  }

  /// Runs the steps in declaration order inside `workspace`.
  pub async fn run(
    &self,
    ctx: &ExecutionContext,
    event: &Event,
    workspace: &Workspace,
    signal: &RunSignal,
  ) -> JobRunResult {
    let started_at = chrono::Utc::now();
    let plugins = ctx.plugins();

    plugins.on_run_job(RunJobEvent {
      id: self.id.clone(),
      name: self.definition.name.clone(),
      runs_on: self.definition.runs_on.clone(),
      needs: self.definition.needs.clone(),
    });
    plugins.on_state_change(WorkflowStateEvent::JobStateUpdated {
      id: self.id.clone(),
      state: WorkflowState::InProgress,
    });

    let environments = merge_environments([&self.environments, &self.definition.environments]);
    let job_timeout = self
      .definition
      .timeout
      .unwrap_or(ctx.config().default_job_timeout);
    let deadline = Instant::now() + job_timeout;

    let mut outputs = JobOutputs::new();
    let mut steps = Vec::with_capacity(self.definition.steps.len());
    let mut failed_step = None;
    let mut cancelled = false;

    for (index, step) in self.definition.steps.iter().enumerate() {
      let id = self.id.step(index);
      cancelled = cancelled || signal.is_cancelled();

      let runnable = !cancelled
        && (step.predicate == StepPredicate::Always || failed_step.is_none());

      if !runnable {
        log::trace!("Step {} is skipped", id);

        let result = StepRunResult::skipped(id, step.name.clone());
        steps.push(ctx.complete_step(result).await);
        continue;
      }

      let step_timeout = step.timeout.unwrap_or(ctx.config().default_step_timeout);
      let remaining = deadline.saturating_duration_since(Instant::now());
      let timeout = match step.predicate {
        // Cleanup steps still run past the job deadline, for one grace period
        StepPredicate::Always => remaining
          .max(ctx.config().cancel_grace_period)
          .min(step_timeout),
        StepPredicate::OnSuccess => remaining.min(step_timeout),
      };

      let result = if timeout.is_zero() {
        log::warn!("Job {} exhausted its time budget before step {}", self.id, index);
        self.exhausted(ctx, id, step.name.clone(), job_timeout).await
      } else {
        ctx
          .run_step(
            StepRun {
              id,
              definition: step.clone(),
              runs_on: self.definition.runs_on.clone(),
              event: event.clone(),
              workspace: workspace.clone(),
              environments: environments.clone(),
              outputs: outputs.clone(),
              timeout,
            },
            signal,
          )
          .await
      };

      if matches!(result.state, WorkflowState::Succeeded | WorkflowState::Failed) {
        if let Some(step_id) = &step.id {
          outputs.insert(step_id.clone(), result.outputs.clone());
        }
      }

      match result.state {
        WorkflowState::Failed if step.continue_on_error => {
          log::trace!("Step {} failed, continuing on error", result.id);
        }
        WorkflowState::Failed => {
          failed_step = failed_step.or(Some(index));
        }
        WorkflowState::Cancelled => cancelled = true,
        _ => {}
      }

      steps.push(result);
    }

    let state = if cancelled {
      WorkflowState::Cancelled
    } else if failed_step.is_some() {
      WorkflowState::Failed
    } else {
      WorkflowState::Succeeded
    };

    let completed_at = chrono::Utc::now();
    log::info!(
      "Job {} finished with state {} in {} seconds",
      self.id,
      state,
      (completed_at - started_at).num_seconds()
    );

    let result = JobRunResult {
      id: self.id.clone(),
      name: self.definition.name.clone(),
      state,
      steps,
      failed_step,
      error: None,
      started_at: Some(started_at),
      completed_at: Some(completed_at),
    };

    self.complete(ctx, result).await
  }

  /// Records the job as cancelled without running it.
  pub async fn cancel(&self, ctx: &ExecutionContext) -> JobRunResult {
    log::trace!("Job {} is cancelled", self.id);

    let result = JobRunResult::cancelled(self.id.clone(), self.definition.name.clone());
    self.complete(ctx, result).await
  }

  /// Records the job as failed before any step could run.
  pub async fn fail(&self, ctx: &ExecutionContext, error: impl Into<String>) -> JobRunResult {
    let error = error.into();
    log::error!("Job {} failed: {}", self.id, error);

    let result = JobRunResult::failed(self.id.clone(), self.definition.name.clone(), error);
    self.complete(ctx, result).await
  }

  async fn complete(&self, ctx: &ExecutionContext, result: JobRunResult) -> JobRunResult {
    ctx
      .plugins()
      .on_state_change(WorkflowStateEvent::JobStateUpdated {
        id: self.id.clone(),
        state: result.state,
      });
    ctx.plugins().on_job_completed(result.clone()).await;

    result
  }

  async fn exhausted(
    &self,
    ctx: &ExecutionContext,
    id: crate::StepId,
    name: Option<String>,
    job_timeout: std::time::Duration,
  ) -> StepRunResult {
    let now = chrono::Utc::now();
    let after = humantime::format_duration(job_timeout).to_string();

    let mut result = StepRunResult::skipped(id, name);
    result.state = WorkflowState::Failed;
    result.failure = Some(Error::timeout(job_timeout).into());
    result.logs = vec![Log::error(format!(
      "Job time budget of {} exhausted before this step",
      after
    ))];
    result.started_at = Some(now);
    result.completed_at = Some(now);

    ctx.complete_step(result).await
  }
}
