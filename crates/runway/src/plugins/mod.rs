mod plugin;

pub use plugin::*;

use crate::{
  Event, JobId, JobRunResult, Result, StepId, StepRunResult, WorkflowId, WorkflowLog,
  WorkflowRunResult, WorkflowStateEvent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type PluginNoopResult = Result<()>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWorkflowEvent {
  pub id: WorkflowId,
  pub workflow: String,
  pub source_hash: String,
  pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobEvent {
  pub id: JobId,
  pub name: Option<String>,
  pub runs_on: String,
  pub needs: Vec<String>,
}

/// Deliberately carries no command text: it may contain secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStepEvent {
  pub id: StepId,
  pub name: String,
}

/// Lifecycle hooks. Every hook has a no-op default, so plugins implement
/// only what they need. A failing hook is logged and otherwise ignored.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str;
  fn on_state_change(&self, _event: WorkflowStateEvent) -> PluginNoopResult {
    Ok(())
  }
  /// Lines arrive with secrets already masked.
  fn on_log(&self, _log: WorkflowLog) -> PluginNoopResult {
    Ok(())
  }
  fn on_run_workflow(&self, _event: RunWorkflowEvent) -> PluginNoopResult {
    Ok(())
  }
  fn on_run_job(&self, _event: RunJobEvent) -> PluginNoopResult {
    Ok(())
  }
  fn on_run_step(&self, _event: RunStepEvent) -> PluginNoopResult {
    Ok(())
  }
  async fn on_step_completed(&self, _result: StepRunResult) -> PluginNoopResult {
    Ok(())
  }
  async fn on_job_completed(&self, _result: JobRunResult) -> PluginNoopResult {
    Ok(())
  }
  async fn on_workflow_completed(&self, _result: WorkflowRunResult) -> PluginNoopResult {
    Ok(())
  }
}

pub type SharedPluginDriver = Arc<PluginDriver>;

#[derive(Default)]
pub struct PluginDriver {
  pub(crate) plugins: Vec<Box<dyn Plugin>>,
}

impl PluginDriver {
  pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
    PluginDriver { plugins }
  }

  pub fn len(&self) -> usize {
    self.plugins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.plugins.is_empty()
  }

  pub fn on_state_change(&self, event: WorkflowStateEvent) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_state_change(event.clone()) {
        log::error!(
          "Plugin {} failed to handle state change: {}",
          plugin.name(),
          err
        );
      }
    }
  }

  pub fn on_log(&self, log: WorkflowLog) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_log(log.clone()) {
        log::error!("Plugin {} failed to handle log: {}", plugin.name(), err);
      }
    }
  }

  pub fn on_run_workflow(&self, event: RunWorkflowEvent) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_run_workflow(event.clone()) {
        log::error!(
          "Plugin {} failed to handle run workflow: {}",
          plugin.name(),
          err
        );
      }
    }
  }

  pub fn on_run_job(&self, event: RunJobEvent) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_run_job(event.clone()) {
        log::error!("Plugin {} failed to handle run job: {}", plugin.name(), err);
      }
    }
  }

  pub fn on_run_step(&self, event: RunStepEvent) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_run_step(event.clone()) {
        log::error!(
          "Plugin {} failed to handle run step: {}",
          plugin.name(),
          err
        );
      }
    }
  }

  pub async fn on_step_completed(&self, result: StepRunResult) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_step_completed(result.clone()).await {
        log::error!(
          "Plugin {} failed to handle step completed: {}",
          plugin.name(),
          err
        );
      }
    }
  }

  pub async fn on_job_completed(&self, result: JobRunResult) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_job_completed(result.clone()).await {
        log::error!(
          "Plugin {} failed to handle job completed: {}",
          plugin.name(),
          err
        );
      }
    }
  }

  pub async fn on_workflow_completed(&self, result: WorkflowRunResult) {
    for plugin in &self.plugins {
      if let Err(err) = plugin.on_workflow_completed(result.clone()).await {
        log::error!(
          "Plugin {} failed to handle workflow completed: {}",
          plugin.name(),
          err
        );
      }
    }
  }
}
