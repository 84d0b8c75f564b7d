mod definition;
mod job;
mod parser;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod user_config;

pub use definition::*;
pub use job::*;
pub use parser::*;
pub use registry::*;
pub use user_config::*;

use crate::{
  Event, ExecutionContext, JobRunResult, Result, RunSignal, RunWorkflowEvent, WorkflowId,
  WorkflowRunResult, WorkflowState, WorkflowStateEvent, Workspace,
};
use indexmap::IndexMap;
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};

/// One run of a workflow definition for one event.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub id: WorkflowId,
  pub definition: Arc<WorkflowDefinition>,
  pub event: Event,
  pub signal: RunSignal,
}

impl Workflow {
  pub fn new(definition: Arc<WorkflowDefinition>, event: Event) -> Self {
    Workflow {
      id: WorkflowId::generate(),
      definition,
      event,
      signal: RunSignal::new(),
    }
  }

  /// Cooperatively cancels every in-flight job and every job not yet started.
  pub fn cancel(&self) -> Result<()> {
    self.signal.cancel()
  }

  /// Runs the job graph. Jobs start as soon as every job they need has
  /// succeeded; a job whose dependency failed or was cancelled is
  /// cancelled without running.
  pub async fn run(&self, ctx: ExecutionContext) -> WorkflowRunResult {
    let created_at = chrono::Utc::now();
    let plugins = ctx.plugins().clone();

    plugins.on_run_workflow(RunWorkflowEvent {
      id: self.id.clone(),
      workflow: self.definition.name.clone(),
      source_hash: self.definition.source_hash.clone(),
      event: self.event.clone(),
    });
    plugins.on_state_change(WorkflowStateEvent::WorkflowStateUpdated {
      id: self.id.clone(),
      state: WorkflowState::InProgress,
    });
    log::info!(
      "Workflow `{}` run {} started for {} at {}",
      self.definition.name,
      self.id,
      self.event.context_key(),
      self.event.short_sha()
    );

    let semaphore = Arc::new(Semaphore::new(ctx.config().max_parallel_jobs.max(1)));
    let mut pending: IndexMap<String, Job> = self
      .definition
      .jobs
      .iter()
      .map(|(key, definition)| {
        let job = Job::new(
          self.id_for(key),
          definition.clone(),
          self.definition.environments.clone(),
        );
        (key.clone(), job)
      })
      .collect();
    let mut results: HashMap<String, JobRunResult> = HashMap::new();
    let mut running = JoinSet::new();

    loop {
      // Settle everything that can be decided now, in declaration order
      let mut index = 0;
      while index < pending.len() {
        let Some((key, job)) = pending.get_index(index) else {
          break;
        };

        let blocked = self.signal.is_cancelled()
          || job.definition.needs.iter().any(|need| {
            results
              .get(need)
              .map(|result| !result.state.is_succeeded())
              .unwrap_or(false)
          });
        let ready = job
          .definition
          .needs
          .iter()
          .all(|need| results.contains_key(need));

        if blocked {
          let key = key.clone();
          let job = job.clone();
          pending.shift_remove(&key);

          results.insert(key, job.cancel(&ctx).await);
          // A new result can unblock or cancel earlier entries
          index = 0;
        } else if ready {
          let key = key.clone();
          let job = job.clone();
          pending.shift_remove(&key);

          running.spawn(self.spawn_job(key, job, ctx.clone(), semaphore.clone()));
        } else {
          index += 1;
        }
      }

      match running.join_next().await {
        Some(Ok((key, result))) => {
          results.insert(key, result);
        }
        Some(Err(err)) => {
          log::error!("Workflow {} lost a job task: {}", self.id, err);
        }
        None => break,
      }
    }

    let mut jobs = IndexMap::new();
    for key in self.definition.jobs.keys() {
      let result = match results.remove(key) {
        Some(result) => result,
        None => JobRunResult::failed(self.id_for(key), None, "Job did not complete"),
      };
      jobs.insert(key.clone(), result);
    }

    let state = if self.signal.is_cancelled() {
      WorkflowState::Cancelled
    } else {
      WorkflowState::aggregate(jobs.values().map(|job| &job.state))
    };

    let completed_at = chrono::Utc::now();
    log::info!(
      "Workflow `{}` run {} finished with state {} in {} seconds",
      self.definition.name,
      self.id,
      state,
      (completed_at - created_at).num_seconds()
    );

    plugins.on_state_change(WorkflowStateEvent::WorkflowStateUpdated {
      id: self.id.clone(),
      state,
    });

    let result = WorkflowRunResult {
      id: self.id.clone(),
      workflow: self.definition.name.clone(),
      source_hash: self.definition.source_hash.clone(),
      event: self.event.clone(),
      state,
      jobs,
      created_at,
      completed_at: Some(completed_at),
    };

    plugins.on_workflow_completed(result.clone()).await;

    result
  }

  fn id_for(&self, key: &str) -> crate::JobId {
    crate::JobId::new(self.id.inner(), key)
  }

  fn spawn_job(
    &self,
    key: String,
    job: Job,
    ctx: ExecutionContext,
    semaphore: Arc<Semaphore>,
  ) -> impl std::future::Future<Output = (String, JobRunResult)> + Send + 'static {
    let event = self.event.clone();
    let signal = self.signal.clone();

    async move {
      let job_id = job.id.clone();
      let name = job.definition.name.clone();

      // A panicking job becomes a failed job instead of taking the run down
      let handle = tokio::spawn(async move {
        let _permit = match semaphore.acquire_owned().await {
          Ok(permit) => permit,
          Err(err) => return job.fail(&ctx, format!("Failed to schedule job: {}", err)).await,
        };

        if signal.is_cancelled() {
          return job.cancel(&ctx).await;
        }

        run_in_workspace(&ctx, &job, &event, &signal).await
      });

      let result = match handle.await {
        Ok(result) => result,
        Err(err) => {
          log::error!("Job {} panicked: {}", job_id, err);
          JobRunResult::failed(job_id, name, format!("Job panicked: {}", err))
        }
      };

      (key, result)
    }
  }
}

/// Fresh workspace checked out at the event SHA, removed afterwards.
async fn run_in_workspace(
  ctx: &ExecutionContext,
  job: &Job,
  event: &Event,
  signal: &RunSignal,
) -> JobRunResult {
  let workspace = Workspace::for_job(&ctx.config().working_directory, event, &job.id);

  if let Err(err) = prepare_workspace(ctx, &workspace, event).await {
    cleanup_workspace(ctx, &workspace).await;
    return job.fail(ctx, err.to_string()).await;
  }

  let result = job.run(ctx, event, &workspace, signal).await;
  cleanup_workspace(ctx, &workspace).await;

  result
}

async fn prepare_workspace(ctx: &ExecutionContext, workspace: &Workspace, event: &Event) -> Result<()> {
  // Leftovers from a crashed process
  workspace.remove().await?;
  workspace.create().await?;

  if let Some(source_control) = ctx.source_control() {
    log::trace!(
      "Checking out {} into {}",
      event.short_sha(),
      workspace.directory.display()
    );
    source_control
      .checkout(event, &event.sha, &workspace.directory)
      .await?;
  }

  Ok(())
}

async fn cleanup_workspace(ctx: &ExecutionContext, workspace: &Workspace) {
  if ctx.config().keep_workspaces {
    return;
  }

  if let Err(err) = workspace.remove().await {
    log::warn!(
      "Failed to remove workspace {}: {}",
      workspace.root.display(),
      err
    );
  }
}
