use super::{Plugin, PluginNoopResult, RunJobEvent, RunStepEvent, RunWorkflowEvent};
use crate::{JobRunResult, StepRunResult, WorkflowLog, WorkflowRunResult, WorkflowStateEvent};

type OnStateChange = dyn Fn(WorkflowStateEvent) -> PluginNoopResult + Send + Sync;
type OnLog = dyn Fn(WorkflowLog) -> PluginNoopResult + Send + Sync;
type OnRunWorkflow = dyn Fn(RunWorkflowEvent) -> PluginNoopResult + Send + Sync;
type OnRunJob = dyn Fn(RunJobEvent) -> PluginNoopResult + Send + Sync;
type OnRunStep = dyn Fn(RunStepEvent) -> PluginNoopResult + Send + Sync;
type OnWorkflowComplete = dyn Fn(WorkflowRunResult) -> PluginNoopResult + Send + Sync;
type OnJobComplete = dyn Fn(JobRunResult) -> PluginNoopResult + Send + Sync;
type OnStepComplete = dyn Fn(StepRunResult) -> PluginNoopResult + Send + Sync;

pub struct PluginBuilder {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_log: Option<Box<OnLog>>,
  on_run_workflow: Option<Box<OnRunWorkflow>>,
  on_run_job: Option<Box<OnRunJob>>,
  on_run_step: Option<Box<OnRunStep>>,
  on_step_completed: Option<Box<OnStepComplete>>,
  on_job_completed: Option<Box<OnJobComplete>>,
  on_workflow_completed: Option<Box<OnWorkflowComplete>>,
}

impl PluginBuilder {
  fn new(name: &'static str) -> Self {
    PluginBuilder {
      name,
      on_state_change: None,
      on_log: None,
      on_run_workflow: None,
      on_run_job: None,
      on_run_step: None,
      on_step_completed: None,
      on_job_completed: None,
      on_workflow_completed: None,
    }
  }

  pub fn on_state_change<T>(mut self, on_state_change: T) -> Self
  where
    T: Fn(WorkflowStateEvent) -> PluginNoopResult + 'static + Send + Sync,
  {
    self.on_state_change = Some(Box::new(on_state_change));
    self
  }

  pub fn on_log<T>(mut self, on_log: T) -> Self
  where
    T: Fn(WorkflowLog) -> PluginNoopResult + 'static + Send + Sync,
  {
    self.on_log = Some(Box::new(on_log));
    self
  }

  pub fn on_run_workflow<T>(mut self, on_run_workflow: T) -> Self
  where
    T: Fn(RunWorkflowEvent) -> PluginNoopResult + 'static + Send + Sync,
  {
    self.on_run_workflow = Some(Box::new(on_run_workflow));
    self
  }

  pub fn on_run_job<T>(mut self, on_run_job: T) -> Self
  where
    T: Fn(RunJobEvent) -> PluginNoopResult + 'static + Send + Sync,
  {
    self.on_run_job = Some(Box::new(on_run_job));
    self
  }

  pub fn on_run_step<T>(mut self, on_run_step: T) -> Self
  where
    T: Fn(RunStepEvent) -> PluginNoopResult + 'static + Send + Sync,
  {
    self.on_run_step = Some(Box::new(on_run_step));
    self
  }

  pub fn on_step_completed<T>(mut self, on_step_completed: T) -> Self
  where
    T: Fn(StepRunResult) -> PluginNoopResult + Send + Sync + 'static,
  {
    self.on_step_completed = Some(Box::new(on_step_completed));
    self
  }

  pub fn on_job_completed<T>(mut self, on_job_completed: T) -> Self
  where
    T: Fn(JobRunResult) -> PluginNoopResult + Send + Sync + 'static,
  {
    self.on_job_completed = Some(Box::new(on_job_completed));
    self
  }

  pub fn on_workflow_completed<T>(mut self, on_workflow_completed: T) -> Self
  where
    T: Fn(WorkflowRunResult) -> PluginNoopResult + Send + Sync + 'static,
  {
    self.on_workflow_completed = Some(Box::new(on_workflow_completed));
    self
  }

  pub fn build(self) -> RunwayPlugin {
    RunwayPlugin {
      name: self.name,
      on_state_change: self.on_state_change,
      on_log: self.on_log,
      on_run_workflow: self.on_run_workflow,
      on_run_job: self.on_run_job,
      on_run_step: self.on_run_step,
      on_step_completed: self.on_step_completed,
      on_job_completed: self.on_job_completed,
      on_workflow_completed: self.on_workflow_completed,
    }
  }
}

/// A plugin assembled from closures, for hooks that need no state of
/// their own.
pub struct RunwayPlugin {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_log: Option<Box<OnLog>>,
  on_run_workflow: Option<Box<OnRunWorkflow>>,
  on_run_job: Option<Box<OnRunJob>>,
  on_run_step: Option<Box<OnRunStep>>,
  on_step_completed: Option<Box<OnStepComplete>>,
  on_job_completed: Option<Box<OnJobComplete>>,
  on_workflow_completed: Option<Box<OnWorkflowComplete>>,
}

impl RunwayPlugin {
  pub fn builder(name: &'static str) -> PluginBuilder {
    PluginBuilder::new(name)
  }
}

#[async_trait::async_trait]
impl Plugin for RunwayPlugin {
  fn name(&self) -> &'static str {
    self.name
  }

  fn on_state_change(&self, event: WorkflowStateEvent) -> PluginNoopResult {
    match &self.on_state_change {
      Some(on_state_change) => on_state_change(event),
      None => Ok(()),
    }
  }

  fn on_log(&self, log: WorkflowLog) -> PluginNoopResult {
    match &self.on_log {
      Some(on_log) => on_log(log),
      None => Ok(()),
    }
  }

  fn on_run_workflow(&self, event: RunWorkflowEvent) -> PluginNoopResult {
    match &self.on_run_workflow {
      Some(on_run_workflow) => on_run_workflow(event),
      None => Ok(()),
    }
  }

  fn on_run_job(&self, event: RunJobEvent) -> PluginNoopResult {
    match &self.on_run_job {
      Some(on_run_job) => on_run_job(event),
      None => Ok(()),
    }
  }

  fn on_run_step(&self, event: RunStepEvent) -> PluginNoopResult {
    match &self.on_run_step {
      Some(on_run_step) => on_run_step(event),
      None => Ok(()),
    }
  }

  async fn on_step_completed(&self, result: StepRunResult) -> PluginNoopResult {
    match &self.on_step_completed {
      Some(on_step_completed) => on_step_completed(result),
      None => Ok(()),
    }
  }

  async fn on_job_completed(&self, result: JobRunResult) -> PluginNoopResult {
    match &self.on_job_completed {
      Some(on_job_completed) => on_job_completed(result),
      None => Ok(()),
    }
  }

  async fn on_workflow_completed(&self, result: WorkflowRunResult) -> PluginNoopResult {
    match &self.on_workflow_completed {
      Some(on_workflow_completed) => on_workflow_completed(result),
      None => Ok(()),
    }
  }
}
